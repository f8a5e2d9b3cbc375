//! Authorization manager.
//!
//! Loads the stored records relevant to a check through the command context
//! and evaluates them with [`crate::precedence`]. Administrators bypass every
//! check.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use runway_command::{AuthorizationChecker, CommandContext};
use runway_core::config::CommandConfig;
use runway_core::{AppResult, MissingAuthorization};
use runway_database::AuthorizationQuery;
use runway_entity::authorization::{Authentication, Authorization, CompositePermissionCheck};

use crate::precedence;

/// Evaluates permission checks against stored authorizations.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationManager {
    admin_users: HashSet<String>,
    admin_groups: HashSet<String>,
}

impl AuthorizationManager {
    /// Creates a manager with the administrator identities from `config`.
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            admin_users: config.admin_users.iter().cloned().collect(),
            admin_groups: config.admin_groups.iter().cloned().collect(),
        }
    }

    /// Whether the identity is an administrator.
    pub fn is_admin(&self, authentication: &Authentication) -> bool {
        self.admin_users.contains(&authentication.user_id)
            || authentication
                .group_ids
                .iter()
                .any(|g| self.admin_groups.contains(g))
    }

    /// Unmet atomic checks of `check` for `authentication`, without duplicates.
    pub async fn evaluate(
        &self,
        ctx: &mut CommandContext,
        authentication: &Authentication,
        check: &CompositePermissionCheck,
    ) -> AppResult<Vec<MissingAuthorization>> {
        if self.is_admin(authentication) {
            return Ok(Vec::new());
        }

        let records = self.load_records(ctx, check).await?;
        let mut seen = HashSet::new();
        let missing: Vec<_> = precedence::missing(&records, authentication, check)
            .into_iter()
            .filter(|m| seen.insert(m.clone()))
            .collect();

        debug!(
            user = %authentication.user_id,
            records = records.len(),
            missing = missing.len(),
            "Evaluated authorization check"
        );
        Ok(missing)
    }

    async fn load_records(
        &self,
        ctx: &mut CommandContext,
        check: &CompositePermissionCheck,
    ) -> AppResult<Vec<Authorization>> {
        let resources: HashSet<_> = check
            .atomic_checks()
            .iter()
            .map(|c| c.resource)
            .collect();
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        ctx.list(AuthorizationQuery::new().resources(resources.into_iter().collect()))
            .await
    }
}

#[async_trait]
impl AuthorizationChecker for AuthorizationManager {
    async fn missing_authorizations(
        &self,
        ctx: &mut CommandContext,
        authentication: &Authentication,
        check: &CompositePermissionCheck,
    ) -> AppResult<Vec<MissingAuthorization>> {
        self.evaluate(ctx, authentication, check).await
    }
}
