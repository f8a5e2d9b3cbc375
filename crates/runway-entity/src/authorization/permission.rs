//! Permissions and the fixed-size permission bitset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use runway_core::AppError;

/// A single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Every permission.
    All,
    /// Read the resource.
    Read,
    /// Modify the resource.
    Update,
    /// Create the resource.
    Create,
    /// Delete the resource.
    Delete,
    /// Access an application.
    Access,
    /// Read instances of a definition.
    ReadInstance,
    /// Modify instances of a definition.
    UpdateInstance,
    /// Create instances of a definition.
    CreateInstance,
    /// Delete instances of a definition.
    DeleteInstance,
    /// Read history.
    ReadHistory,
    /// Delete history.
    DeleteHistory,
}

impl Permission {
    /// Every permission that owns a bit.
    pub const SINGLE: [Permission; 11] = [
        Self::Read,
        Self::Update,
        Self::Create,
        Self::Delete,
        Self::Access,
        Self::ReadInstance,
        Self::UpdateInstance,
        Self::CreateInstance,
        Self::DeleteInstance,
        Self::ReadHistory,
        Self::DeleteHistory,
    ];

    /// Bit mask of the permission.
    pub fn mask(&self) -> u32 {
        match self {
            Self::All => u32::MAX,
            Self::Read => 1 << 1,
            Self::Update => 1 << 2,
            Self::Create => 1 << 3,
            Self::Delete => 1 << 4,
            Self::Access => 1 << 5,
            Self::ReadInstance => 1 << 6,
            Self::UpdateInstance => 1 << 7,
            Self::CreateInstance => 1 << 8,
            Self::DeleteInstance => 1 << 9,
            Self::ReadHistory => 1 << 10,
            Self::DeleteHistory => 1 << 11,
        }
    }

    /// Return the permission name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Access => "ACCESS",
            Self::ReadInstance => "READ_INSTANCE",
            Self::UpdateInstance => "UPDATE_INSTANCE",
            Self::CreateInstance => "CREATE_INSTANCE",
            Self::DeleteInstance => "DELETE_INSTANCE",
            Self::ReadHistory => "READ_HISTORY",
            Self::DeleteHistory => "DELETE_HISTORY",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        if upper == "ALL" {
            return Ok(Self::All);
        }
        Self::SINGLE
            .iter()
            .copied()
            .find(|p| p.as_str() == upper)
            .ok_or_else(|| AppError::validation(format!("Unknown permission: {s}")))
    }
}

/// Fixed-size set of permissions.
///
/// For GRANT and GLOBAL authorizations the set holds the granted
/// permissions; for REVOKE authorizations it holds the revoked ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u32);

impl PermissionSet {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// The set of every permission.
    pub const ALL: Self = Self(u32::MAX);

    /// Build a set from individual permissions.
    pub fn of(permissions: &[Permission]) -> Self {
        let mut set = Self::NONE;
        for permission in permissions {
            set.add(*permission);
        }
        set
    }

    /// Raw bits.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Add a permission.
    pub fn add(&mut self, permission: Permission) {
        self.0 |= permission.mask();
    }

    /// Remove a permission.
    pub fn remove(&mut self, permission: Permission) {
        self.0 &= !permission.mask();
    }

    /// Replace the whole set.
    pub fn replace(&mut self, permissions: &[Permission]) {
        *self = Self::of(permissions);
    }

    /// Whether `permission` is in the set. `All` requires every bit.
    pub fn contains(&self, permission: Permission) -> bool {
        let mask = permission.mask();
        self.0 & mask == mask
    }

    /// Whether every permission in `permissions` is in the set.
    pub fn contains_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.contains(*p))
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Individual permissions in the set.
    pub fn permissions(&self) -> Vec<Permission> {
        if *self == Self::ALL {
            return vec![Permission::All];
        }
        Permission::SINGLE
            .iter()
            .copied()
            .filter(|p| self.contains(*p))
            .collect()
    }
}
