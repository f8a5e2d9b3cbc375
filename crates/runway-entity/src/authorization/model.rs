//! Authorization entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use runway_core::AppError;
use runway_core::types::AuthorizationId;

use super::permission::PermissionSet;
use super::resource::Resource;

/// Wildcard for "any user" or "any resource instance".
pub const ANY: &str = "*";

/// Kind of authorization record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorizationType {
    /// Applies to every user; lowest precedence.
    Global,
    /// Grants the listed permissions.
    Grant,
    /// Revokes the listed permissions.
    Revoke,
}

impl fmt::Display for AuthorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
        }
    }
}

/// A stored permission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    /// Unique identifier.
    pub id: AuthorizationId,
    /// Record kind.
    pub auth_type: AuthorizationType,
    /// User the rule applies to (`*` for everyone).
    pub user_id: Option<String>,
    /// Group the rule applies to.
    pub group_id: Option<String>,
    /// Protected resource type.
    pub resource: Resource,
    /// Resource instance, or `*`.
    pub resource_id: String,
    /// Granted (GRANT/GLOBAL) or revoked (REVOKE) permissions.
    pub permissions: PermissionSet,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Optimistic-locking revision.
    pub revision: i64,
}

impl Authorization {
    /// Create an empty record of the given kind on `resource`/`resource_id`.
    pub fn new(
        auth_type: AuthorizationType,
        resource: Resource,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: AuthorizationId::new(),
            auth_type,
            user_id: if auth_type == AuthorizationType::Global {
                Some(ANY.to_string())
            } else {
                None
            },
            group_id: None,
            resource,
            resource_id: resource_id.into(),
            permissions: PermissionSet::NONE,
            created_at: Utc::now(),
            revision: 0,
        }
    }

    /// Assign the record to a user.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.group_id = None;
        self
    }

    /// Assign the record to a group.
    pub fn for_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self.user_id = None;
        self
    }

    /// Set the permission set.
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    /// Whether the record applies to a specific resource instance.
    pub fn is_instance_scoped(&self) -> bool {
        self.resource_id != ANY
    }

    /// Check the structural rules of a record.
    pub fn validate(&self) -> Result<(), AppError> {
        match (&self.user_id, &self.group_id) {
            (Some(_), Some(_)) => {
                return Err(AppError::validation(
                    "Authorization must not have both a user id and a group id",
                ));
            }
            (None, None) => {
                return Err(AppError::validation(
                    "Authorization must have either a user id or a group id",
                ));
            }
            _ => {}
        }

        if self.group_id.as_deref() == Some(ANY) {
            return Err(AppError::validation(
                "Cannot use wildcard '*' as group id; only user id may be a wildcard",
            ));
        }

        if self.auth_type == AuthorizationType::Global && self.user_id.as_deref() != Some(ANY) {
            return Err(AppError::validation(
                "GLOBAL authorizations must apply to user '*' and no group",
            ));
        }

        if self.resource_id.is_empty() {
            return Err(AppError::validation("Authorization resource id must not be empty"));
        }

        Ok(())
    }
}
