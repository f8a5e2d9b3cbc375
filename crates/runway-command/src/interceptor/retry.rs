//! Optimistic-concurrency retry.

use async_trait::async_trait;
use tracing::warn;

use runway_core::AppResult;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// Re-executes a top-level command from scratch when it fails with a
/// concurrent-modification error.
///
/// Every attempt gets a fresh context because this interceptor sits outside
/// the context interceptor. Nested invocations pass straight through: the
/// conflict surfaces at the top-level command, which is the one retried.
#[derive(Debug)]
pub struct RetryInterceptor {
    max_retries: u32,
}

impl RetryInterceptor {
    /// Retry up to `max_retries` times after the first attempt.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

#[async_trait]
impl CommandInterceptor for RetryInterceptor {
    async fn intercept(
        &self,
        invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput> {
        if invocation.is_nested() || !invocation.command.retryable() {
            return next.run(invocation).await;
        }

        let mut retries = 0;
        loop {
            match next.run(invocation.detached()).await {
                Err(err) if err.is_concurrent_modification() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        command = invocation.command.name(),
                        attempt = retries + 1,
                        error = %err,
                        "Concurrent modification detected, retrying command"
                    );
                }
                Err(err) if err.is_concurrent_modification() => {
                    warn!(
                        command = invocation.command.name(),
                        retries,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}
