//! Incident domain entities.

pub mod model;

pub use model::{FAILED_JOB_INCIDENT, Incident};
