//! Job definition entity.

use serde::{Deserialize, Serialize};

use runway_core::types::JobDefinitionId;

/// Shared settings for a family of jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Unique identifier.
    pub id: JobDefinitionId,
    /// Type of the jobs created from this definition.
    pub job_type: String,
    /// Definition-level configuration string.
    pub job_configuration: Option<String>,
    /// Priority applied to jobs of this definition instead of their own.
    pub overriding_priority: Option<i64>,
    /// Suspended definitions create suspended jobs.
    pub suspended: bool,
    /// Owning deployment.
    pub deployment_id: Option<String>,
    /// Owning tenant.
    pub tenant_id: Option<String>,
    /// Optimistic-locking revision.
    pub revision: i64,
}

impl JobDefinition {
    /// Create an active definition for `job_type`.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            id: JobDefinitionId::new(),
            job_type: job_type.into(),
            job_configuration: None,
            overriding_priority: None,
            suspended: false,
            deployment_id: None,
            tenant_id: None,
            revision: 0,
        }
    }
}
