//! Job service: scheduling and administration of jobs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;

use runway_command::{Command, CommandContext, CommandExecutor, TransactionPhase};
use runway_core::types::{JobDefinitionId, JobId};
use runway_core::AppResult;
use runway_database::{IncidentQuery, JobDefinitionQuery, JobQuery};
use runway_entity::authorization::Authentication;
use runway_entity::incident::Incident;
use runway_entity::job::{Job, JobDefinition};

use crate::management::{
    CreateJobDefinitionCmd, DeleteJobCmd, FindIncidentsCmd, FindJobDefinitionsCmd, FindJobsCmd,
    GetJobExceptionStacktraceCmd, RetriesTarget, ScheduleJobCmd, SetJobDefinitionPriorityCmd,
    SetJobDueDateCmd, SetJobPriorityCmd, SetJobRetriesCmd, SetSuspensionStateCmd,
    SuspensionTarget, UnlockJobCmd,
};

/// Schedules and administers jobs.
///
/// Operations run unauthenticated unless the service was scoped to a caller
/// with [`JobService::as_caller`].
#[derive(Debug, Clone)]
pub struct JobService {
    commands: CommandExecutor,
    hint: Option<Arc<Notify>>,
    default_retries: i32,
    caller: Option<Authentication>,
}

impl JobService {
    /// Creates a new job service.
    pub fn new(commands: CommandExecutor, default_retries: i32) -> Self {
        Self {
            commands,
            hint: None,
            default_retries,
            caller: None,
        }
    }

    /// Wake the acquisition loop through `hint` whenever a due job commits.
    pub fn with_hint(mut self, hint: Arc<Notify>) -> Self {
        self.hint = Some(hint);
        self
    }

    /// A copy of the service that runs every operation as `caller`.
    pub fn as_caller(&self, caller: Authentication) -> Self {
        Self {
            caller: Some(caller),
            ..self.clone()
        }
    }

    async fn run<C: Command>(&self, command: &C) -> AppResult<C::Output> {
        match &self.caller {
            Some(caller) => self.commands.execute_as(caller, command).await,
            None => self.commands.execute(command).await,
        }
    }

    /// Retry count new jobs start with.
    pub fn default_retries(&self) -> i32 {
        self.default_retries
    }

    /// Store a new job.
    pub async fn schedule(&self, job: Job) -> AppResult<Job> {
        let job = self
            .run(&HintingScheduleCmd {
                inner: ScheduleJobCmd { job },
                hint: self.hint.clone(),
            })
            .await?;
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            due_date = %job.due_date,
            "Scheduled job"
        );
        Ok(job)
    }

    /// Store a new job definition.
    pub async fn create_job_definition(
        &self,
        definition: JobDefinition,
    ) -> AppResult<JobDefinition> {
        self.run(&CreateJobDefinitionCmd { definition }).await
    }

    /// Clear the lease of a job.
    pub async fn unlock(&self, job_id: JobId) -> AppResult<()> {
        self.run(&UnlockJobCmd { job_id }).await
    }

    /// Set the retries of a job.
    pub async fn set_job_retries(&self, job_id: JobId, retries: i32) -> AppResult<()> {
        self.run(&SetJobRetriesCmd {
            target: RetriesTarget::Job(job_id),
            retries,
        })
        .await
        .map(|_| ())
    }

    /// Set the retries of every job of a definition. Returns how many jobs changed.
    pub async fn set_job_retries_by_definition(
        &self,
        definition_id: JobDefinitionId,
        retries: i32,
    ) -> AppResult<usize> {
        self.run(&SetJobRetriesCmd {
            target: RetriesTarget::JobDefinition(definition_id),
            retries,
        })
        .await
    }

    /// Reset the retries of a job to the configured default.
    pub async fn reset_job_retries(&self, job_id: JobId) -> AppResult<()> {
        self.set_job_retries(job_id, self.default_retries).await
    }

    /// Move the due date of a job.
    pub async fn set_job_due_date(&self, job_id: JobId, due_date: DateTime<Utc>) -> AppResult<()> {
        self.run(&SetJobDueDateCmd { job_id, due_date }).await
    }

    /// Set the priority of a job.
    pub async fn set_job_priority(&self, job_id: JobId, priority: i64) -> AppResult<()> {
        self.run(&SetJobPriorityCmd { job_id, priority }).await
    }

    /// Set or clear the overriding priority of a definition.
    pub async fn set_job_definition_priority(
        &self,
        definition_id: JobDefinitionId,
        priority: Option<i64>,
        cascade: bool,
    ) -> AppResult<()> {
        self.run(&SetJobDefinitionPriorityCmd {
            definition_id,
            priority,
            cascade,
        })
        .await
    }

    /// Suspend a job.
    pub async fn suspend_job(&self, job_id: JobId) -> AppResult<()> {
        self.set_suspension(SuspensionTarget::Job(job_id), true).await
    }

    /// Activate a job.
    pub async fn activate_job(&self, job_id: JobId) -> AppResult<()> {
        self.set_suspension(SuspensionTarget::Job(job_id), false).await
    }

    /// Suspend a job definition, and optionally its jobs.
    pub async fn suspend_job_definition(
        &self,
        id: JobDefinitionId,
        include_jobs: bool,
    ) -> AppResult<()> {
        self.set_suspension(SuspensionTarget::JobDefinition { id, include_jobs }, true)
            .await
    }

    /// Activate a job definition, and optionally its jobs.
    pub async fn activate_job_definition(
        &self,
        id: JobDefinitionId,
        include_jobs: bool,
    ) -> AppResult<()> {
        self.set_suspension(SuspensionTarget::JobDefinition { id, include_jobs }, false)
            .await
    }

    async fn set_suspension(&self, target: SuspensionTarget, suspended: bool) -> AppResult<()> {
        self.run(&SetSuspensionStateCmd { target, suspended })
            .await
            .map(|_| ())
    }

    /// Delete a job that is not under a live lease.
    pub async fn delete_job(&self, job_id: JobId) -> AppResult<()> {
        self.run(&DeleteJobCmd { job_id }).await
    }

    /// Error chain recorded for the job's last failure.
    pub async fn job_exception_stacktrace(&self, job_id: JobId) -> AppResult<Option<String>> {
        self.run(&GetJobExceptionStacktraceCmd { job_id }).await
    }

    /// Jobs matching `query`.
    pub async fn jobs(&self, query: JobQuery) -> AppResult<Vec<Job>> {
        self.run(&FindJobsCmd { query }).await
    }

    /// Job definitions matching `query`.
    pub async fn job_definitions(
        &self,
        query: JobDefinitionQuery,
    ) -> AppResult<Vec<JobDefinition>> {
        self.run(&FindJobDefinitionsCmd { query }).await
    }

    /// Incidents matching `query`.
    pub async fn incidents(&self, query: IncidentQuery) -> AppResult<Vec<Incident>> {
        self.run(&FindIncidentsCmd { query }).await
    }
}

/// Schedules a job and, once committed, wakes the acquisition loop if the
/// job is already due.
#[derive(Debug, Clone)]
struct HintingScheduleCmd {
    inner: ScheduleJobCmd,
    hint: Option<Arc<Notify>>,
}

#[async_trait]
impl Command for HintingScheduleCmd {
    type Output = Job;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Job> {
        let job = ctx.execute(&self.inner).await?;
        if let Some(hint) = &self.hint {
            if job.due_date <= ctx.now() && !job.suspended {
                let hint = Arc::clone(hint);
                ctx.register_listener(TransactionPhase::Committed, move || {
                    hint.notify_one();
                    Ok(())
                });
            }
        }
        Ok(job)
    }

    fn name(&self) -> &'static str {
        "ScheduleJobCmd"
    }
}
