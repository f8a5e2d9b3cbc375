//! Authorization commands.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use runway_command::{Command, CommandContext};
use runway_core::types::AuthorizationId;
use runway_core::{AppError, AppResult};
use runway_database::AuthorizationQuery;
use runway_entity::authorization::{
    ANY, Authentication, Authorization, CompositePermissionCheck, Permission, Resource,
};

use crate::manager::AuthorizationManager;

fn on_authorization(
    permission: Permission,
    resource_id: impl Into<String>,
) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(permission, Resource::Authorization, resource_id)
}

/// Stores a new authorization record.
#[derive(Debug, Clone)]
pub struct CreateAuthorizationCmd {
    /// The record to store.
    pub authorization: Authorization,
}

#[async_trait]
impl Command for CreateAuthorizationCmd {
    type Output = Authorization;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Authorization> {
        self.authorization.validate()?;
        ctx.require_authorization(on_authorization(Permission::Create, ANY));

        let candidate = &self.authorization;
        let duplicate = ctx
            .list(
                AuthorizationQuery::new()
                    .resources(vec![candidate.resource])
                    .resource_id(candidate.resource_id.clone())
                    .auth_type(candidate.auth_type),
            )
            .await?
            .into_iter()
            .any(|a| a.user_id == candidate.user_id && a.group_id == candidate.group_id);
        if duplicate {
            return Err(AppError::conflict(format!(
                "An authorization of type {} for {} '{}' already exists for this identity",
                candidate.auth_type, candidate.resource, candidate.resource_id
            )));
        }

        let mut record = candidate.clone();
        record.created_at = ctx.now();
        ctx.insert(record)?;
        ctx.get(candidate.id.into_uuid()).await
    }
}

/// How to change the permissions of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionChange {
    /// Add one permission.
    Add(Permission),
    /// Remove one permission.
    Remove(Permission),
    /// Replace the whole set.
    Replace(Vec<Permission>),
}

/// Changes the permission set of an existing record.
#[derive(Debug, Clone)]
pub struct UpdatePermissionsCmd {
    /// Record to change.
    pub authorization_id: AuthorizationId,
    /// The change.
    pub change: PermissionChange,
}

#[async_trait]
impl Command for UpdatePermissionsCmd {
    type Output = Authorization;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Authorization> {
        let id = self.authorization_id.into_uuid();
        let mut record: Authorization = ctx.get(id).await?;
        ctx.require_authorization(on_authorization(Permission::Update, id.to_string()));

        match &self.change {
            PermissionChange::Add(p) => record.permissions.add(*p),
            PermissionChange::Remove(p) => record.permissions.remove(*p),
            PermissionChange::Replace(ps) => record.permissions.replace(ps),
        }
        ctx.update(record)?;
        ctx.get(id).await
    }
}

/// Deletes an authorization record.
#[derive(Debug, Clone)]
pub struct DeleteAuthorizationCmd {
    /// Record to delete.
    pub authorization_id: AuthorizationId,
}

#[async_trait]
impl Command for DeleteAuthorizationCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let id = self.authorization_id.into_uuid();
        let record: Authorization = ctx.get(id).await?;
        ctx.require_authorization(on_authorization(Permission::Delete, id.to_string()));
        ctx.delete(&record);
        info!(authorization_id = %id, "Deleted authorization");
        Ok(())
    }
}

/// Lists authorization records.
#[derive(Debug, Clone, Default)]
pub struct FindAuthorizationsCmd {
    /// Filter.
    pub query: AuthorizationQuery,
}

#[async_trait]
impl Command for FindAuthorizationsCmd {
    type Output = Vec<Authorization>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Vec<Authorization>> {
        ctx.require_authorization(on_authorization(Permission::Read, ANY));
        ctx.list(self.query.clone()).await
    }
}

/// Fails with the complete list of unmet checks unless the calling identity
/// satisfies `check`. Unauthenticated callers always pass.
#[derive(Debug, Clone)]
pub struct CheckAuthorizationCmd {
    /// Evaluator.
    pub manager: Arc<AuthorizationManager>,
    /// Check to evaluate.
    pub check: CompositePermissionCheck,
}

#[async_trait]
impl Command for CheckAuthorizationCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let Some(authentication) = ctx.authentication().cloned() else {
            return Ok(());
        };
        let missing = self.manager.evaluate(ctx, &authentication, &self.check).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::authorization_denied(&authentication.user_id, missing))
        }
    }

    fn retryable(&self) -> bool {
        false
    }
}

/// Whether another identity satisfies `check`. Requires READ on
/// authorizations.
#[derive(Debug, Clone)]
pub struct IsUserAuthorizedCmd {
    /// Evaluator.
    pub manager: Arc<AuthorizationManager>,
    /// Identity to evaluate.
    pub subject: Authentication,
    /// Check to evaluate.
    pub check: CompositePermissionCheck,
}

#[async_trait]
impl Command for IsUserAuthorizedCmd {
    type Output = bool;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<bool> {
        ctx.require_authorization(on_authorization(Permission::Read, ANY));
        let missing = self.manager.evaluate(ctx, &self.subject, &self.check).await?;
        Ok(missing.is_empty())
    }
}
