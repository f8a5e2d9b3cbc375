//! Context management.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use runway_core::{AppResult, Clock};
use runway_database::Datastore;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;
use crate::context::CommandContext;

/// Opens a [`CommandContext`] for top-level commands and pushes a frame for
/// nested ones. A failing nested frame marks the context rollback-only.
#[derive(Debug)]
pub struct ContextInterceptor {
    datastore: Arc<dyn Datastore>,
    clock: Arc<dyn Clock>,
}

impl ContextInterceptor {
    /// Create the interceptor over a datastore and clock.
    pub fn new(datastore: Arc<dyn Datastore>, clock: Arc<dyn Clock>) -> Self {
        Self { datastore, clock }
    }
}

#[async_trait]
impl CommandInterceptor for ContextInterceptor {
    async fn intercept(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput> {
        let command = invocation.command.name();

        if let Some(ctx) = invocation.context.take() {
            ctx.push_frame(command);
            let result = next.run(invocation.with_context(&mut *ctx)).await;
            ctx.pop_frame();
            if let Err(err) = &result {
                ctx.mark_rollback_only(err.clone());
            }
            return result;
        }

        let session = self.datastore.open_session().await?;
        let mut ctx = CommandContext::new(
            session,
            invocation.authentication.cloned(),
            Arc::clone(invocation.chain),
            Arc::clone(&self.clock),
        );

        ctx.push_frame(command);
        let result = next.run(invocation.with_context(&mut ctx)).await;
        ctx.pop_frame();

        if let Err(e) = ctx.session_mut().close().await {
            warn!(command, error = %e, "Failed to close persistence session");
        }
        result
    }
}
