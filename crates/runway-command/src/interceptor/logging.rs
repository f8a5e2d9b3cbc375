//! Command logging.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, trace};

use runway_core::AppResult;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// Logs every command with its nesting and duration.
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl CommandInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput> {
        let command = invocation.command.name();
        let nested = invocation.is_nested();
        trace!(command, nested, "Starting command");

        let started = Instant::now();
        let result = next.run(invocation).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(command, nested, elapsed_ms, "Command finished"),
            Err(e) => debug!(command, nested, elapsed_ms, error = %e, "Command failed"),
        }
        result
    }
}
