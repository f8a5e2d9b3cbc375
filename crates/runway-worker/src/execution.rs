//! Job execution and failure handling commands.
//!
//! A job runs in its own transaction through [`ExecuteJobCmd`]. When that
//! transaction fails it has already rolled back, so the failure is recorded
//! by [`HandleJobFailureCmd`] in a second transaction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use runway_command::{Command, CommandContext};
use runway_core::types::JobId;
use runway_core::{AppError, AppResult, ErrorKind};
use runway_database::IncidentQuery;
use runway_entity::incident::{FAILED_JOB_INCIDENT, Incident};
use runway_entity::job::Job;

use crate::backoff::RetryBackoff;
use crate::handler::{JobExecutionContext, JobHandlerRegistry};

/// `now + delay`, saturating at the latest representable instant.
pub(crate) fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Delete every incident of `job_id`. Returns how many were removed.
pub(crate) async fn resolve_incidents(ctx: &mut CommandContext, job_id: JobId) -> AppResult<usize> {
    let incidents = ctx.list(IncidentQuery::new().job_id(job_id)).await?;
    for incident in &incidents {
        ctx.delete(incident);
    }
    Ok(incidents.len())
}

/// Create the failed-job incident of `job` unless one already exists.
pub(crate) async fn ensure_incident(ctx: &mut CommandContext, job: &Job) -> AppResult<bool> {
    let existing = ctx
        .list(
            IncidentQuery::new()
                .job_id(job.id)
                .incident_type(FAILED_JOB_INCIDENT),
        )
        .await?;
    if !existing.is_empty() {
        return Ok(false);
    }

    let now = ctx.now();
    ctx.insert(Incident::failed_job(
        job.id,
        job.job_definition_id,
        job.exception_message.clone(),
        job.tenant_id.clone(),
        now,
    ))?;
    Ok(true)
}

/// Result of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The handler succeeded and the job was deleted.
    Completed,
    /// The handler succeeded and asked to run again at the given time.
    Rescheduled(DateTime<Utc>),
    /// Nothing ran: the job is gone, suspended, or leased by someone else.
    Skipped,
    /// The handler failed; the failure was recorded.
    Failed(FailureOutcome),
}

/// How a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Retries remain; the job is due again at the given time.
    Retrying(DateTime<Utc>),
    /// No retries remain; an incident exists for the job.
    Exhausted,
    /// The lease was released without consuming a retry.
    Released,
    /// The job is gone or leased by someone else.
    Ignored,
}

/// Runs one job's handler inside the job's transaction.
#[derive(Debug, Clone)]
pub struct ExecuteJobCmd {
    /// Job to run.
    pub job_id: JobId,
    /// Lease owner the job must still belong to; `None` runs it regardless.
    pub lock_owner: Option<String>,
    /// Handlers by job type.
    pub registry: Arc<JobHandlerRegistry>,
}

#[async_trait]
impl Command for ExecuteJobCmd {
    type Output = JobOutcome;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<JobOutcome> {
        let id = self.job_id.into_uuid();
        let Some(mut job) = ctx.find::<Job>(id).await? else {
            debug!(job_id = %self.job_id, "Job no longer exists, skipping");
            return Ok(JobOutcome::Skipped);
        };

        if let Some(owner) = &self.lock_owner {
            if job.lock_owner.as_deref() != Some(owner.as_str()) {
                debug!(job_id = %job.id, owner = %owner, "Lease lost before execution, skipping");
                return Ok(JobOutcome::Skipped);
            }
        }

        if job.suspended {
            debug!(job_id = %job.id, "Job was suspended after acquisition, releasing");
            job.unlock();
            ctx.update(job)?;
            return Ok(JobOutcome::Skipped);
        }

        let handler = self.registry.get(&job.job_type)?;
        let mut execution = JobExecutionContext::new(job.clone());
        handler
            .execute(
                &job.configuration,
                &mut execution,
                ctx,
                job.tenant_id.as_deref(),
            )
            .await?;

        // The handler may have changed the job through the context.
        let Some(mut job) = ctx.find::<Job>(id).await? else {
            return Ok(JobOutcome::Completed);
        };

        match execution.rescheduled_at() {
            Some(due_date) => {
                job.due_date = due_date;
                job.unlock();
                job.exception_message = None;
                job.exception_stacktrace = None;
                ctx.update(job)?;
                Ok(JobOutcome::Rescheduled(due_date))
            }
            None => {
                resolve_incidents(ctx, job.id).await?;
                ctx.delete(&job);
                Ok(JobOutcome::Completed)
            }
        }
    }
}

/// Records a failed execution on the job.
#[derive(Debug, Clone)]
pub struct HandleJobFailureCmd {
    /// Failed job.
    pub job_id: JobId,
    /// Lease owner that ran the job; `None` for synchronous execution.
    pub lock_owner: Option<String>,
    /// Kind of the failure.
    pub kind: ErrorKind,
    /// Failure message.
    pub message: String,
    /// Rendered error chain.
    pub stacktrace: String,
    /// Delay policy for the next attempt.
    pub backoff: RetryBackoff,
}

impl HandleJobFailureCmd {
    /// Capture `error` for `job_id`.
    pub fn new(
        job_id: JobId,
        lock_owner: Option<String>,
        error: &AppError,
        backoff: RetryBackoff,
    ) -> Self {
        Self {
            job_id,
            lock_owner,
            kind: error.kind,
            message: error.message.clone(),
            stacktrace: error.chain_report(),
            backoff,
        }
    }
}

#[async_trait]
impl Command for HandleJobFailureCmd {
    type Output = FailureOutcome;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<FailureOutcome> {
        let Some(mut job) = ctx.find::<Job>(self.job_id.into_uuid()).await? else {
            return Ok(FailureOutcome::Ignored);
        };
        if let Some(owner) = &self.lock_owner {
            if job.lock_owner.as_deref() != Some(owner.as_str()) {
                return Ok(FailureOutcome::Ignored);
            }
        }

        job.exception_message = Some(self.message.clone());
        job.unlock();

        match self.kind {
            ErrorKind::ConcurrentModification => {
                ctx.update(job)?;
                return Ok(FailureOutcome::Released);
            }
            ErrorKind::Fatal => {
                // No retries left keeps the job out of acquisition until reset.
                job.retries = 0;
                job.exception_stacktrace = Some(self.stacktrace.clone());
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "Job failed fatally, parked until its retries are reset: {}",
                    self.message
                );
                ensure_incident(ctx, &job).await?;
                ctx.update(job)?;
                return Ok(FailureOutcome::Exhausted);
            }
            ErrorKind::Configuration => {
                job.retries = 0;
            }
            _ => {
                job.retries -= 1;
            }
        }

        job.failed_attempts += 1;
        job.exception_stacktrace = Some(self.stacktrace.clone());

        if job.retries > 0 {
            let due_date = after(ctx.now(), self.backoff.delay(job.failed_attempts));
            job.due_date = due_date;
            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                retries = job.retries,
                due_date = %due_date,
                "Job failed, retry scheduled: {}",
                self.message
            );
            ctx.update(job)?;
            Ok(FailureOutcome::Retrying(due_date))
        } else {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                "Job failed with no retries left: {}",
                self.message
            );
            ensure_incident(ctx, &job).await?;
            ctx.update(job)?;
            Ok(FailureOutcome::Exhausted)
        }
    }
}
