//! Incident entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runway_core::types::{IncidentId, JobDefinitionId, JobId};

/// Incident type raised when a job runs out of retries.
pub const FAILED_JOB_INCIDENT: &str = "failedJob";

/// An operator-visible record of a job that needs attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier.
    pub id: IncidentId,
    /// Incident type, e.g. [`FAILED_JOB_INCIDENT`].
    pub incident_type: String,
    /// Failed job; its `exception_stacktrace` holds the details.
    pub job_id: JobId,
    /// Definition of the failed job.
    pub job_definition_id: Option<JobDefinitionId>,
    /// Failure message.
    pub message: Option<String>,
    /// Owning tenant.
    pub tenant_id: Option<String>,
    /// When the incident was raised.
    pub created_at: DateTime<Utc>,
    /// Optimistic-locking revision.
    pub revision: i64,
}

impl Incident {
    /// Create a failed-job incident for `job_id`.
    pub fn failed_job(
        job_id: JobId,
        job_definition_id: Option<JobDefinitionId>,
        message: Option<String>,
        tenant_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IncidentId::new(),
            incident_type: FAILED_JOB_INCIDENT.to_string(),
            job_id,
            job_definition_id,
            message,
            tenant_id,
            created_at,
            revision: 0,
        }
    }
}
