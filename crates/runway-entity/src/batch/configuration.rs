//! Batch configuration payloads.

use serde::{Deserialize, Serialize};

use runway_core::types::BatchId;

/// One element a batch operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchElement {
    /// Element id (job id, instance id, ...).
    pub id: String,
    /// Deployment the element belongs to, if known.
    pub deployment_id: Option<String>,
}

impl BatchElement {
    /// Create an element without a deployment.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deployment_id: None,
        }
    }

    /// Create an element that belongs to a deployment.
    pub fn in_deployment(id: impl Into<String>, deployment_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deployment_id: Some(deployment_id.into()),
        }
    }
}

/// A run of consecutive ids in [`BatchConfiguration::ids`] that share a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMapping {
    /// Deployment of the run; `None` for unmapped elements.
    pub deployment_id: Option<String>,
    /// Number of ids in the run.
    pub count: usize,
}

/// Batch-wide configuration, serialized once when the batch is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfiguration {
    /// Element ids grouped by deployment, in mapping order.
    pub ids: Vec<String>,
    /// Deployment runs covering `ids`.
    pub id_mappings: Vec<DeploymentMapping>,
    /// Type-specific operation payload shared by all execution jobs.
    pub payload: serde_json::Value,
}

/// Configuration of a single execution job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobConfiguration {
    /// Owning batch.
    pub batch_id: BatchId,
    /// Element ids handled by this job.
    pub ids: Vec<String>,
}
