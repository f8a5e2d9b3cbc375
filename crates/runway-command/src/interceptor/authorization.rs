//! Authorization enforcement.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use runway_core::{AppError, AppResult, MissingAuthorization};
use runway_entity::authorization::{Authentication, CompositePermissionCheck};

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// Evaluates permission check trees against stored authorizations.
#[async_trait]
pub trait AuthorizationChecker: Send + Sync + fmt::Debug {
    /// The atomic checks of `check` that `authentication` does not satisfy.
    /// An empty result means the check passes.
    async fn missing_authorizations(
        &self,
        ctx: &mut crate::context::CommandContext,
        authentication: &Authentication,
        check: &CompositePermissionCheck,
    ) -> AppResult<Vec<MissingAuthorization>>;
}

/// Evaluates the checks a command registered on its frame once the body has
/// finished, before anything is flushed. Unauthenticated invocations (jobs,
/// internal work) are not checked.
#[derive(Debug)]
pub struct AuthorizationInterceptor {
    checker: Arc<dyn AuthorizationChecker>,
    enabled: bool,
}

impl AuthorizationInterceptor {
    /// Create the interceptor.
    pub fn new(checker: Arc<dyn AuthorizationChecker>, enabled: bool) -> Self {
        Self { checker, enabled }
    }
}

#[async_trait]
impl CommandInterceptor for AuthorizationInterceptor {
    async fn intercept(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> AppResult<CommandOutput> {
        let Some(ctx) = invocation.context.take() else {
            return Err(AppError::internal(
                "Authorization interceptor requires a command context",
            ));
        };

        let output = next.run(invocation.with_context(&mut *ctx)).await?;

        let checks = ctx.take_frame_checks();
        if !self.enabled || checks.is_empty() {
            return Ok(output);
        }
        let Some(authentication) = ctx.authentication().cloned() else {
            return Ok(output);
        };

        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for check in &checks {
            for m in self
                .checker
                .missing_authorizations(ctx, &authentication, check)
                .await?
            {
                if seen.insert(m.clone()) {
                    missing.push(m);
                }
            }
        }

        if missing.is_empty() {
            Ok(output)
        } else {
            debug!(
                user = %authentication.user_id,
                command = invocation.command.name(),
                missing = missing.len(),
                "Authorization denied"
            );
            Err(AppError::authorization_denied(
                &authentication.user_id,
                missing,
            ))
        }
    }
}
