//! Administrative job commands.
//!
//! Every command registers its permission check on the frame; the checks
//! only apply when the command runs on behalf of an authenticated caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use runway_command::{Command, CommandContext, TransactionPhase};
use runway_core::types::{JobDefinitionId, JobId};
use runway_core::{AppError, AppResult};
use runway_database::{IncidentQuery, JobDefinitionQuery, JobQuery};
use runway_entity::authorization::{ANY, CompositePermissionCheck, Permission, Resource};
use runway_entity::incident::Incident;
use runway_entity::job::{Job, JobDefinition};

use crate::execution::{ensure_incident, resolve_incidents};

fn on_job(permission: Permission, job_id: JobId) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(permission, Resource::Job, job_id.to_string())
}

fn on_definition(permission: Permission, id: JobDefinitionId) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(permission, Resource::JobDefinition, id.to_string())
}

/// Stores a new job.
///
/// A job attached to a definition with an overriding priority takes that
/// priority, and a suspended definition yields a suspended job.
#[derive(Debug, Clone)]
pub struct ScheduleJobCmd {
    /// Job to store.
    pub job: Job,
}

#[async_trait]
impl Command for ScheduleJobCmd {
    type Output = Job;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Job> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Create,
            Resource::Job,
            ANY,
        ));

        let mut job = self.job.clone();
        if let Some(definition_id) = job.job_definition_id {
            let definition: JobDefinition = ctx.get(definition_id.into_uuid()).await?;
            if let Some(priority) = definition.overriding_priority {
                job.priority = priority;
            }
            job.suspended |= definition.suspended;
        }
        job.created_at = ctx.now();
        ctx.insert(job.clone())?;
        job.revision = 1;
        Ok(job)
    }
}

/// Stores a new job definition.
#[derive(Debug, Clone)]
pub struct CreateJobDefinitionCmd {
    /// Definition to store.
    pub definition: JobDefinition,
}

#[async_trait]
impl Command for CreateJobDefinitionCmd {
    type Output = JobDefinition;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<JobDefinition> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Create,
            Resource::JobDefinition,
            ANY,
        ));
        ctx.insert(self.definition.clone())?;
        ctx.get(self.definition.id.into_uuid()).await
    }
}

/// Clears the lease of a job. Retries are untouched.
#[derive(Debug, Clone)]
pub struct UnlockJobCmd {
    /// Job to unlock.
    pub job_id: JobId,
}

#[async_trait]
impl Command for UnlockJobCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut job: Job = ctx.get(self.job_id.into_uuid()).await?;
        ctx.require_authorization(on_job(Permission::Update, job.id));
        if job.lock_owner.is_some() {
            job.unlock();
            ctx.update(job)?;
        }
        Ok(())
    }
}

/// Which jobs a retries change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetriesTarget {
    /// One job.
    Job(JobId),
    /// Every job of a definition.
    JobDefinition(JobDefinitionId),
}

/// Sets the retry counter of one job or of every job of a definition.
///
/// Positive retries resolve the job's incidents and release a job that failed
/// while still leased; zero creates the failed-job incident.
#[derive(Debug, Clone)]
pub struct SetJobRetriesCmd {
    /// Jobs to change.
    pub target: RetriesTarget,
    /// New retry count; must not be negative.
    pub retries: i32,
}

#[async_trait]
impl Command for SetJobRetriesCmd {
    type Output = usize;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<usize> {
        if self.retries < 0 {
            return Err(AppError::validation(format!(
                "The number of job retries must be a non-negative integer, got {}",
                self.retries
            )));
        }

        let jobs = match self.target {
            RetriesTarget::Job(job_id) => {
                let job: Job = ctx.get(job_id.into_uuid()).await?;
                ctx.require_authorization(on_job(Permission::Update, job_id));
                vec![job]
            }
            RetriesTarget::JobDefinition(definition_id) => {
                ctx.get::<JobDefinition>(definition_id.into_uuid()).await?;
                ctx.require_authorization(on_definition(Permission::Update, definition_id));
                ctx.list(JobQuery::new().job_definition_id(definition_id))
                    .await?
            }
        };

        let count = jobs.len();
        for mut job in jobs {
            let previous = job.retries;
            job.retries = self.retries;

            if self.retries > 0 {
                resolve_incidents(ctx, job.id).await?;
                if previous <= 0 && job.lock_owner.is_some() {
                    job.unlock();
                }
            } else {
                ensure_incident(ctx, &job).await?;
            }
            ctx.update(job)?;
        }
        Ok(count)
    }
}

/// Moves the due date of a job.
#[derive(Debug, Clone)]
pub struct SetJobDueDateCmd {
    /// Job to change.
    pub job_id: JobId,
    /// New due date.
    pub due_date: DateTime<Utc>,
}

#[async_trait]
impl Command for SetJobDueDateCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut job: Job = ctx.get(self.job_id.into_uuid()).await?;
        ctx.require_authorization(on_job(Permission::Update, job.id));
        job.due_date = self.due_date;
        ctx.update(job)
    }
}

/// Sets the priority of a job.
#[derive(Debug, Clone)]
pub struct SetJobPriorityCmd {
    /// Job to change.
    pub job_id: JobId,
    /// New priority.
    pub priority: i64,
}

#[async_trait]
impl Command for SetJobPriorityCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut job: Job = ctx.get(self.job_id.into_uuid()).await?;
        ctx.require_authorization(on_job(Permission::Update, job.id));
        job.priority = self.priority;
        ctx.update(job)
    }
}

/// Sets or clears the overriding priority of a job definition, optionally
/// applying it to the definition's existing jobs.
#[derive(Debug, Clone)]
pub struct SetJobDefinitionPriorityCmd {
    /// Definition to change.
    pub definition_id: JobDefinitionId,
    /// New overriding priority; `None` clears it.
    pub priority: Option<i64>,
    /// Also set the priority of existing jobs.
    pub cascade: bool,
}

#[async_trait]
impl Command for SetJobDefinitionPriorityCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut definition: JobDefinition = ctx.get(self.definition_id.into_uuid()).await?;
        ctx.require_authorization(on_definition(Permission::Update, definition.id));

        definition.overriding_priority = self.priority;
        ctx.update(definition)?;

        if let (true, Some(priority)) = (self.cascade, self.priority) {
            for mut job in ctx
                .list(JobQuery::new().job_definition_id(self.definition_id))
                .await?
            {
                job.priority = priority;
                ctx.update(job)?;
            }
        }
        Ok(())
    }
}

/// Which entity a suspension change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionTarget {
    /// One job.
    Job(JobId),
    /// A job definition, and optionally its jobs.
    JobDefinition {
        /// Definition to change.
        id: JobDefinitionId,
        /// Also change the definition's jobs.
        include_jobs: bool,
    },
}

/// Suspends or activates a job or job definition. Suspended jobs are never
/// acquired.
#[derive(Debug, Clone)]
pub struct SetSuspensionStateCmd {
    /// What to change.
    pub target: SuspensionTarget,
    /// `true` to suspend, `false` to activate.
    pub suspended: bool,
}

#[async_trait]
impl Command for SetSuspensionStateCmd {
    type Output = usize;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<usize> {
        let jobs = match self.target {
            SuspensionTarget::Job(job_id) => {
                let job: Job = ctx.get(job_id.into_uuid()).await?;
                ctx.require_authorization(on_job(Permission::Update, job_id));
                vec![job]
            }
            SuspensionTarget::JobDefinition { id, include_jobs } => {
                let mut definition: JobDefinition = ctx.get(id.into_uuid()).await?;
                ctx.require_authorization(on_definition(Permission::Update, id));
                if definition.suspended != self.suspended {
                    definition.suspended = self.suspended;
                    ctx.update(definition)?;
                }
                if include_jobs {
                    ctx.list(JobQuery::new().job_definition_id(id)).await?
                } else {
                    Vec::new()
                }
            }
        };

        let mut changed = 0;
        for mut job in jobs {
            if job.suspended != self.suspended {
                job.suspended = self.suspended;
                ctx.update(job)?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Deletes a job and its incidents. A job under a live lease cannot be
/// deleted.
#[derive(Debug, Clone)]
pub struct DeleteJobCmd {
    /// Job to delete.
    pub job_id: JobId,
}

#[async_trait]
impl Command for DeleteJobCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let job: Job = ctx.get(self.job_id.into_uuid()).await?;
        ctx.require_authorization(on_job(Permission::Delete, job.id));

        if job.is_locked(ctx.now()) {
            return Err(AppError::conflict(format!(
                "Cannot delete job {} while it is locked by '{}'",
                job.id,
                job.lock_owner.as_deref().unwrap_or_default()
            )));
        }

        resolve_incidents(ctx, job.id).await?;
        ctx.delete(&job);

        let job_id = job.id;
        ctx.register_listener(TransactionPhase::Committed, move || {
            info!(job_id = %job_id, "Deleted job");
            Ok(())
        });
        Ok(())
    }
}

/// Full error chain recorded for a job's last failure.
#[derive(Debug, Clone)]
pub struct GetJobExceptionStacktraceCmd {
    /// Job to inspect.
    pub job_id: JobId,
}

#[async_trait]
impl Command for GetJobExceptionStacktraceCmd {
    type Output = Option<String>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Option<String>> {
        let job: Job = ctx.get(self.job_id.into_uuid()).await?;
        ctx.require_authorization(on_job(Permission::Read, job.id));
        Ok(job.exception_stacktrace)
    }
}

/// Lists jobs.
#[derive(Debug, Clone, Default)]
pub struct FindJobsCmd {
    /// Filter.
    pub query: JobQuery,
}

#[async_trait]
impl Command for FindJobsCmd {
    type Output = Vec<Job>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Vec<Job>> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Read,
            Resource::Job,
            ANY,
        ));
        ctx.list(self.query.clone()).await
    }
}

/// Lists job definitions.
#[derive(Debug, Clone, Default)]
pub struct FindJobDefinitionsCmd {
    /// Filter.
    pub query: JobDefinitionQuery,
}

#[async_trait]
impl Command for FindJobDefinitionsCmd {
    type Output = Vec<JobDefinition>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Vec<JobDefinition>> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Read,
            Resource::JobDefinition,
            ANY,
        ));
        ctx.list(self.query.clone()).await
    }
}

/// Lists incidents.
#[derive(Debug, Clone, Default)]
pub struct FindIncidentsCmd {
    /// Filter.
    pub query: IncidentQuery,
}

#[async_trait]
impl Command for FindIncidentsCmd {
    type Output = Vec<Incident>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Vec<Incident>> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Read,
            Resource::Job,
            ANY,
        ));
        ctx.list(self.query.clone()).await
    }
}
