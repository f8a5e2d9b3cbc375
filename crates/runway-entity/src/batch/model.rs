//! Batch entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runway_core::types::{BatchId, JobDefinitionId};

/// A bulk operation decomposed into execution jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier.
    pub id: BatchId,
    /// Batch type; also the job type of the execution jobs.
    pub batch_type: String,
    /// Number of execution jobs the batch decomposes into.
    pub total_jobs: u32,
    /// Number of execution jobs created so far by the seed job.
    pub jobs_created: u32,
    /// Number of elements handled by each execution job.
    pub invocations_per_batch_job: u32,
    /// Maximum number of execution jobs created per seed run.
    pub batch_jobs_per_seed: u32,
    /// Definition of the seed job.
    pub seed_job_definition_id: JobDefinitionId,
    /// Definition of the monitor job.
    pub monitor_job_definition_id: JobDefinitionId,
    /// Definition of the execution jobs.
    pub batch_job_definition_id: JobDefinitionId,
    /// Serialized [`super::BatchConfiguration`]; cleared on completion.
    pub configuration: Option<serde_json::Value>,
    /// Owning tenant.
    pub tenant_id: Option<String>,
    /// User that created the batch.
    pub created_by: Option<String>,
    /// Suspended batches create suspended jobs.
    pub suspended: bool,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
    /// When the monitor observed completion.
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-locking revision.
    pub revision: i64,
}

impl Batch {
    /// Whether the seed job has created every execution job.
    pub fn is_seeded(&self) -> bool {
        self.jobs_created >= self.total_jobs
    }

    /// Whether the monitor has completed the batch.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}
