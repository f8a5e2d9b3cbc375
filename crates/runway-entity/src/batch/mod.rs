//! Batch domain entities.

pub mod configuration;
pub mod model;

pub use configuration::{BatchConfiguration, BatchElement, BatchJobConfiguration, DeploymentMapping};
pub use model::Batch;
