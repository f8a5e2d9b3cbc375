//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runway_core::types::{JobDefinitionId, JobId};

use super::state::JobState;

/// A persisted unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Handler type key.
    pub job_type: String,
    /// Handler-specific payload.
    pub configuration: Vec<u8>,
    /// Remaining attempts; `<= 0` means exhausted.
    pub retries: i32,
    /// Number of failed executions so far; drives the retry backoff.
    pub failed_attempts: u32,
    /// Executor currently holding the lease.
    pub lock_owner: Option<String>,
    /// End of the current lease.
    pub lock_expiration_time: Option<DateTime<Utc>>,
    /// Earliest instant the job may be acquired.
    pub due_date: DateTime<Utc>,
    /// Acquisition priority (higher first).
    pub priority: i64,
    /// Message of the last failure.
    pub exception_message: Option<String>,
    /// Full error report of the last failure.
    pub exception_stacktrace: Option<String>,
    /// Deployment the job belongs to.
    pub deployment_id: Option<String>,
    /// Owning tenant.
    pub tenant_id: Option<String>,
    /// Definition this job was created from.
    pub job_definition_id: Option<JobDefinitionId>,
    /// Suspended jobs are never acquired.
    pub suspended: bool,
    /// Optimistic-locking revision.
    pub revision: i64,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create an unclaimed job that is due at `due_date`.
    pub fn new(
        job_type: impl Into<String>,
        configuration: Vec<u8>,
        retries: i32,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            configuration,
            retries,
            failed_attempts: 0,
            lock_owner: None,
            lock_expiration_time: None,
            due_date,
            priority: 0,
            exception_message: None,
            exception_stacktrace: None,
            deployment_id: None,
            tenant_id: None,
            job_definition_id: None,
            suspended: false,
            revision: 0,
            created_at: due_date,
        }
    }

    /// Set the acquisition priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Attach the job to a deployment.
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Attach the job to a job definition.
    pub fn with_definition(mut self, definition_id: JobDefinitionId) -> Self {
        self.job_definition_id = Some(definition_id);
        self
    }

    /// Whether a non-expired lease is held at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_owner.is_some() && self.lock_expiration_time.is_some_and(|exp| exp > now)
    }

    /// Whether an acquisition at `now` may claim this job.
    pub fn is_acquirable(&self, now: DateTime<Utc>) -> bool {
        !self.suspended && self.retries > 0 && self.due_date <= now && !self.is_locked(now)
    }

    /// Drop the lease.
    pub fn unlock(&mut self) {
        self.lock_owner = None;
        self.lock_expiration_time = None;
    }

    /// Derived state at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> JobState {
        if self.suspended {
            JobState::Suspended
        } else if self.retries <= 0 {
            JobState::Failed
        } else if self.is_locked(now) {
            JobState::Claimed
        } else if self.due_date <= now {
            JobState::Due
        } else {
            JobState::Waiting
        }
    }
}
