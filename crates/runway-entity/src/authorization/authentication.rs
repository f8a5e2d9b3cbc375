//! Caller identity.

use serde::{Deserialize, Serialize};

/// The identity a command runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// Authenticated user.
    pub user_id: String,
    /// Groups the user belongs to.
    pub group_ids: Vec<String>,
    /// Tenants the user belongs to.
    pub tenant_ids: Vec<String>,
}

impl Authentication {
    /// Authenticate a user without groups or tenants.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_ids: Vec::new(),
            tenant_ids: Vec::new(),
        }
    }

    /// Add group memberships.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_ids.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Add tenant memberships.
    pub fn with_tenants<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tenant_ids.extend(tenants.into_iter().map(Into::into));
        self
    }

    /// Whether the user is a member of `group_id`.
    pub fn is_member_of(&self, group_id: &str) -> bool {
        self.group_ids.iter().any(|g| g == group_id)
    }
}
