//! Authorization domain entities.

pub mod authentication;
pub mod check;
pub mod model;
pub mod permission;
pub mod resource;

pub use authentication::Authentication;
pub use check::{CompositePermissionCheck, PermissionCheck};
pub use model::{ANY, Authorization, AuthorizationType};
pub use permission::{Permission, PermissionSet};
pub use resource::Resource;
