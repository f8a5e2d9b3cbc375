//! Interceptor chain.
//!
//! The chain is an immutable ordered slice composed once when the executor
//! is built. Each interceptor receives the [`Invocation`] and a [`Next`]
//! handle to the remainder of the chain; the end of the chain executes the
//! command body on the invocation's context.

pub mod authorization;
pub mod context;
pub mod logging;
pub mod retry;
pub mod transaction;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use runway_core::{AppError, AppResult};
use runway_entity::authorization::Authentication;

use crate::command::{CommandOutput, DynCommand};
use crate::context::CommandContext;

/// One command passing through the chain.
pub struct Invocation<'a> {
    /// The command being executed.
    pub command: &'a dyn DynCommand,
    /// Context of the caller for nested invocations; `None` at top level
    /// until the context interceptor opens one.
    pub context: Option<&'a mut CommandContext>,
    /// Identity for a new top-level context.
    pub authentication: Option<&'a Authentication>,
    /// The chain itself, handed to new contexts for nested execution.
    pub chain: &'a Arc<CommandChain>,
}

impl<'a> Invocation<'a> {
    /// Whether the invocation runs inside an existing context.
    pub fn is_nested(&self) -> bool {
        self.context.is_some()
    }

    /// Same invocation without a context.
    pub fn detached(&self) -> Invocation<'a> {
        Invocation {
            command: self.command,
            context: None,
            authentication: self.authentication,
            chain: self.chain,
        }
    }

    /// Same invocation bound to `context`.
    pub fn with_context<'b>(&self, context: &'b mut CommandContext) -> Invocation<'b>
    where
        'a: 'b,
    {
        Invocation {
            command: self.command,
            context: Some(context),
            authentication: self.authentication,
            chain: self.chain,
        }
    }
}

/// Handle to the remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn CommandInterceptor>],
}

impl<'a> Next<'a> {
    /// Pass the invocation to the next interceptor, or execute the command
    /// body when the chain is exhausted.
    pub fn run<'b>(self, invocation: Invocation<'b>) -> BoxFuture<'b, AppResult<CommandOutput>>
    where
        'a: 'b,
    {
        match self.remaining.split_first() {
            Some((head, rest)) => head.intercept(invocation, Next { remaining: rest }),
            None => Box::pin(async move {
                let Invocation {
                    command, context, ..
                } = invocation;
                match context {
                    Some(ctx) => command.execute_dyn(ctx).await,
                    None => Err(AppError::internal(format!(
                        "Command '{}' reached the end of the chain without a context",
                        command.name()
                    ))),
                }
            }),
        }
    }
}

/// Middleware wrapping every command.
#[async_trait]
pub trait CommandInterceptor: Send + Sync + fmt::Debug {
    /// Handle the invocation, usually by delegating to `next`.
    async fn intercept(
        &self,
        invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput>;
}

/// Immutable ordered list of interceptors.
#[derive(Debug, Default)]
pub struct CommandChain {
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
}

impl CommandChain {
    /// Compose a chain; the first interceptor is the outermost.
    pub fn new(interceptors: Vec<Arc<dyn CommandInterceptor>>) -> Self {
        Self { interceptors }
    }

    /// Run an invocation through the whole chain.
    pub fn run<'a>(
        &'a self,
        invocation: Invocation<'a>,
    ) -> BoxFuture<'a, AppResult<CommandOutput>> {
        Next {
            remaining: &self.interceptors,
        }
        .run(invocation)
    }
}
