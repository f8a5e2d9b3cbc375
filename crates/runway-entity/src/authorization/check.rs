//! Permission check trees.

use serde::{Deserialize, Serialize};

use runway_core::MissingAuthorization;

use super::permission::Permission;
use super::resource::Resource;

/// An atomic check: does the caller hold `permission` on `resource`/`resource_id`?
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionCheck {
    /// Required permission.
    pub permission: Permission,
    /// Resource type.
    pub resource: Resource,
    /// Resource instance, or `*` for a type-wide check.
    pub resource_id: String,
}

impl PermissionCheck {
    /// Check on a specific resource instance.
    pub fn new(permission: Permission, resource: Resource, resource_id: impl Into<String>) -> Self {
        Self {
            permission,
            resource,
            resource_id: resource_id.into(),
        }
    }

    /// Convert into the error payload reported on denial.
    pub fn to_missing(&self) -> MissingAuthorization {
        MissingAuthorization {
            permission: self.permission.as_str().to_string(),
            resource: self.resource.as_str().to_string(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// A tree of permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositePermissionCheck {
    /// A single check.
    Atomic(PermissionCheck),
    /// Every child must pass.
    All(Vec<CompositePermissionCheck>),
    /// At least one child must pass.
    Any(Vec<CompositePermissionCheck>),
}

impl CompositePermissionCheck {
    /// Single-check tree.
    pub fn atomic(
        permission: Permission,
        resource: Resource,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::Atomic(PermissionCheck::new(permission, resource, resource_id))
    }

    /// Every atomic check in the tree, depth first.
    pub fn atomic_checks(&self) -> Vec<&PermissionCheck> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a PermissionCheck>) {
        match self {
            Self::Atomic(check) => out.push(check),
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect(out);
                }
            }
        }
    }
}

impl From<PermissionCheck> for CompositePermissionCheck {
    fn from(check: PermissionCheck) -> Self {
        Self::Atomic(check)
    }
}
