//! # runway-auth
//!
//! Authorization for the Runway command pipeline.
//!
//! ## Modules
//!
//! - `precedence`: pure evaluation of GRANT/GLOBAL/REVOKE records
//! - `manager`: loads records through the command context; plugs into the
//!   authorization interceptor
//! - `command`: commands managing authorization records
//! - `service`: facade executing those commands for a caller

pub mod command;
pub mod manager;
pub mod precedence;
pub mod service;

pub use command::PermissionChange;
pub use manager::AuthorizationManager;
pub use service::AuthorizationService;
