//! Transaction demarcation.

use async_trait::async_trait;
use tracing::{debug, warn};

use runway_core::{AppError, AppResult};

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;
use crate::context::CommandContext;
use crate::listener::TransactionPhase;

/// Commits the context of a top-level command, or rolls it back.
///
/// Commit order: before-commit listeners, flush, commit, after-commit
/// listeners. Any failure up to and including the commit rolls back and
/// runs the after-rollback listeners. Nested frames pass straight through.
#[derive(Debug, Default)]
pub struct TransactionInterceptor;

impl TransactionInterceptor {
    async fn commit(ctx: &mut CommandContext) -> AppResult<()> {
        for listener in ctx.take_listeners(TransactionPhase::Committing) {
            listener()?;
        }

        let operations = ctx.pending_operations();
        let count = operations.len();
        ctx.session_mut().flush(operations).await?;
        ctx.session_mut().commit().await?;
        debug!(operations = count, "Transaction committed");

        for listener in ctx.take_listeners(TransactionPhase::Committed) {
            if let Err(e) = listener() {
                warn!(error = %e, "After-commit listener failed");
            }
        }
        Ok(())
    }

    async fn rollback(ctx: &mut CommandContext, cause: &AppError) {
        debug!(error = %cause, "Rolling back transaction");
        if let Err(e) = ctx.session_mut().rollback().await {
            warn!(error = %e, "Failed to roll back transaction");
        }

        drop(ctx.take_listeners(TransactionPhase::Committing));
        drop(ctx.take_listeners(TransactionPhase::Committed));
        for listener in ctx.take_listeners(TransactionPhase::RolledBack) {
            if let Err(e) = listener() {
                warn!(error = %e, "After-rollback listener failed");
            }
        }
    }
}

#[async_trait]
impl CommandInterceptor for TransactionInterceptor {
    async fn intercept(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput> {
        let Some(ctx) = invocation.context.take() else {
            return Err(AppError::internal(
                "Transaction interceptor requires a command context",
            ));
        };

        if ctx.depth() > 1 {
            return next.run(invocation.with_context(ctx)).await;
        }

        let result = match next.run(invocation.with_context(&mut *ctx)).await {
            Ok(output) => match ctx.rollback_cause() {
                Some(cause) => Err(cause.clone()),
                None => Ok(output),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(output) => match Self::commit(ctx).await {
                Ok(()) => Ok(output),
                Err(err) => {
                    Self::rollback(ctx, &err).await;
                    Err(err)
                }
            },
            Err(err) => {
                Self::rollback(ctx, &err).await;
                Err(err)
            }
        }
    }
}
