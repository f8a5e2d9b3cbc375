//! Authorization service.

use std::sync::Arc;

use runway_command::CommandExecutor;
use runway_core::AppResult;
use runway_core::types::AuthorizationId;
use runway_database::AuthorizationQuery;
use runway_entity::authorization::{
    Authentication, Authorization, CompositePermissionCheck, Permission,
};

use crate::command::{
    CheckAuthorizationCmd, CreateAuthorizationCmd, DeleteAuthorizationCmd, FindAuthorizationsCmd,
    IsUserAuthorizedCmd, PermissionChange, UpdatePermissionsCmd,
};
use crate::manager::AuthorizationManager;

/// Authorization operations, each executed as a command on behalf of the
/// calling identity.
#[derive(Debug, Clone)]
pub struct AuthorizationService {
    commands: CommandExecutor,
    manager: Arc<AuthorizationManager>,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    pub fn new(commands: CommandExecutor, manager: Arc<AuthorizationManager>) -> Self {
        Self { commands, manager }
    }

    /// Store a new authorization record.
    pub async fn create_authorization(
        &self,
        caller: &Authentication,
        authorization: Authorization,
    ) -> AppResult<Authorization> {
        self.commands
            .execute_as(caller, &CreateAuthorizationCmd { authorization })
            .await
    }

    /// Add `permission` to a record.
    pub async fn add_permission(
        &self,
        caller: &Authentication,
        authorization_id: AuthorizationId,
        permission: Permission,
    ) -> AppResult<Authorization> {
        self.update_permissions(caller, authorization_id, PermissionChange::Add(permission))
            .await
    }

    /// Remove `permission` from a record.
    pub async fn remove_permission(
        &self,
        caller: &Authentication,
        authorization_id: AuthorizationId,
        permission: Permission,
    ) -> AppResult<Authorization> {
        self.update_permissions(caller, authorization_id, PermissionChange::Remove(permission))
            .await
    }

    /// Replace the permissions of a record.
    pub async fn replace_permissions(
        &self,
        caller: &Authentication,
        authorization_id: AuthorizationId,
        permissions: Vec<Permission>,
    ) -> AppResult<Authorization> {
        self.update_permissions(caller, authorization_id, PermissionChange::Replace(permissions))
            .await
    }

    async fn update_permissions(
        &self,
        caller: &Authentication,
        authorization_id: AuthorizationId,
        change: PermissionChange,
    ) -> AppResult<Authorization> {
        self.commands
            .execute_as(
                caller,
                &UpdatePermissionsCmd {
                    authorization_id,
                    change,
                },
            )
            .await
    }

    /// Delete a record.
    pub async fn delete_authorization(
        &self,
        caller: &Authentication,
        authorization_id: AuthorizationId,
    ) -> AppResult<()> {
        self.commands
            .execute_as(caller, &DeleteAuthorizationCmd { authorization_id })
            .await
    }

    /// List records matching `query`.
    pub async fn authorizations(
        &self,
        caller: &Authentication,
        query: AuthorizationQuery,
    ) -> AppResult<Vec<Authorization>> {
        self.commands
            .execute_as(caller, &FindAuthorizationsCmd { query })
            .await
    }

    /// Fail with every unmet atomic check unless `caller` satisfies `check`.
    pub async fn check_authorization(
        &self,
        caller: &Authentication,
        check: CompositePermissionCheck,
    ) -> AppResult<()> {
        self.commands
            .execute_as(
                caller,
                &CheckAuthorizationCmd {
                    manager: Arc::clone(&self.manager),
                    check,
                },
            )
            .await
    }

    /// Whether `subject` satisfies `check`.
    pub async fn is_user_authorized(
        &self,
        caller: &Authentication,
        subject: Authentication,
        check: CompositePermissionCheck,
    ) -> AppResult<bool> {
        self.commands
            .execute_as(
                caller,
                &IsUserAuthorizedCmd {
                    manager: Arc::clone(&self.manager),
                    subject,
                    check,
                },
            )
            .await
    }
}
