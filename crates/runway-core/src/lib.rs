//! # runway-core
//!
//! Core crate for the Runway automation runtime. Contains configuration
//! schemas, typed identifiers, the clock abstraction, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other Runway crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AppError, ErrorKind, MissingAuthorization};
pub use result::AppResult;
