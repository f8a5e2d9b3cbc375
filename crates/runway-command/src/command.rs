//! Command contract.

use std::any::Any;

use async_trait::async_trait;

use runway_core::AppResult;

use crate::context::CommandContext;

/// Type-erased command result travelling through the interceptor chain.
pub type CommandOutput = Box<dyn Any + Send>;

/// A unit of work executed inside a [`CommandContext`].
///
/// Commands are re-executed from scratch when the retry interceptor sees a
/// concurrent-modification conflict, so `execute` must derive everything it
/// writes from what it reads through the context.
#[async_trait]
pub trait Command: Send + Sync {
    /// Value returned to the caller.
    type Output: Send + 'static;

    /// Run the command.
    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Self::Output>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Whether a concurrent-modification conflict may re-run the command.
    fn retryable(&self) -> bool {
        true
    }
}

/// Object-safe view of a [`Command`] used by interceptors.
#[async_trait]
pub trait DynCommand: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether a concurrent-modification conflict may re-run the command.
    fn retryable(&self) -> bool;

    /// Run the command and box its output.
    async fn execute_dyn(&self, ctx: &mut CommandContext) -> AppResult<CommandOutput>;
}

#[async_trait]
impl<C: Command> DynCommand for C {
    fn name(&self) -> &'static str {
        Command::name(self)
    }

    fn retryable(&self) -> bool {
        Command::retryable(self)
    }

    async fn execute_dyn(&self, ctx: &mut CommandContext) -> AppResult<CommandOutput> {
        let output = self.execute(ctx).await?;
        Ok(Box::new(output))
    }
}
