//! Batch creation and administration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{info, warn};

use runway_command::{Command, CommandContext, CommandExecutor, TransactionPhase};
use runway_core::config::BatchConfig;
use runway_core::types::{BatchId, JobDefinitionId};
use runway_core::{AppError, AppResult};
use runway_database::{BatchQuery, IncidentQuery, JobQuery};
use runway_entity::authorization::{
    ANY, Authentication, CompositePermissionCheck, Permission, Resource,
};
use runway_entity::batch::{Batch, BatchElement};
use runway_entity::job::{Job, JobDefinition};
use runway_worker::JobHandlerRegistry;

use crate::handler::{BatchExecutionJobHandler, BatchHandlerRegistry, encode};
use crate::monitor::{MONITOR_JOB_TYPE, MonitorJobHandler};
use crate::planning::{group_by_deployment, plan_chunks};
use crate::seed::{SEED_JOB_TYPE, SeedJobHandler};

fn on_batch(permission: Permission, batch_id: BatchId) -> CompositePermissionCheck {
    CompositePermissionCheck::atomic(permission, Resource::Batch, batch_id.to_string())
}

fn definition_ids(batch: &Batch) -> [JobDefinitionId; 3] {
    [
        batch.seed_job_definition_id,
        batch.monitor_job_definition_id,
        batch.batch_job_definition_id,
    ]
}

/// Elements a new batch operates on.
#[derive(Debug, Clone)]
pub enum ElementSelector {
    /// An explicit element list.
    Static(Vec<BatchElement>),
    /// Every job matching the query, keyed by job id and grouped by the
    /// job's deployment.
    Jobs(JobQuery),
}

/// Creates a batch: its three job definitions, the batch record and the
/// first seed job.
#[derive(Debug, Clone)]
pub struct CreateBatchCmd {
    /// Batch type; must have a registered handler.
    pub batch_type: String,
    /// Elements to operate on.
    pub selector: ElementSelector,
    /// Payload shared by every execution job.
    pub payload: serde_json::Value,
    /// Elements per execution job.
    pub invocations_per_batch_job: u32,
    /// Execution jobs created per seed run.
    pub batch_jobs_per_seed: u32,
    /// Retries of the seed job.
    pub default_retries: i32,
    /// Handlers by batch type.
    pub handlers: Arc<BatchHandlerRegistry>,
    /// Woken once the seed job commits.
    pub hint: Option<Arc<Notify>>,
}

#[async_trait]
impl Command for CreateBatchCmd {
    type Output = Batch;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Batch> {
        let handler = self.handlers.get(&self.batch_type)?;
        handler.validate(&self.payload)?;
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Create,
            Resource::Batch,
            ANY,
        ));

        let elements = match &self.selector {
            ElementSelector::Static(elements) => elements.clone(),
            ElementSelector::Jobs(query) => ctx
                .list(query.clone())
                .await?
                .into_iter()
                .map(|job| BatchElement {
                    id: job.id.to_string(),
                    deployment_id: job.deployment_id,
                })
                .collect(),
        };
        if elements.is_empty() {
            return Err(AppError::validation("A batch needs at least one element"));
        }

        let configuration = group_by_deployment(elements, self.payload.clone());
        let total_jobs = plan_chunks(&configuration, self.invocations_per_batch_job).len();
        let tenant_id = ctx
            .authentication()
            .and_then(|auth| auth.tenant_ids.first().cloned());
        let batch_id = BatchId::new();

        let mut definitions = Vec::with_capacity(3);
        for job_type in [SEED_JOB_TYPE, MONITOR_JOB_TYPE, self.batch_type.as_str()] {
            let mut definition = JobDefinition::new(job_type);
            definition.job_configuration = Some(batch_id.to_string());
            definition.tenant_id = tenant_id.clone();
            definitions.push(definition.id);
            ctx.insert(definition)?;
        }

        let now = ctx.now();
        let mut batch = Batch {
            id: batch_id,
            batch_type: self.batch_type.clone(),
            total_jobs: total_jobs as u32,
            jobs_created: 0,
            invocations_per_batch_job: self.invocations_per_batch_job.max(1),
            batch_jobs_per_seed: self.batch_jobs_per_seed.max(1),
            seed_job_definition_id: definitions[0],
            monitor_job_definition_id: definitions[1],
            batch_job_definition_id: definitions[2],
            configuration: Some(serde_json::to_value(&configuration)?),
            tenant_id: tenant_id.clone(),
            created_by: ctx.authentication().map(|auth| auth.user_id.clone()),
            suspended: false,
            created_at: now,
            completed_at: None,
            revision: 0,
        };

        let mut seed = Job::new(SEED_JOB_TYPE, encode(&batch_id)?, self.default_retries, now)
            .with_definition(batch.seed_job_definition_id);
        seed.tenant_id = tenant_id;
        ctx.insert(seed)?;
        ctx.insert(batch.clone())?;
        batch.revision = 1;

        if let Some(hint) = &self.hint {
            let hint = Arc::clone(hint);
            ctx.register_listener(TransactionPhase::Committed, move || {
                hint.notify_one();
                Ok(())
            });
        }

        info!(
            batch_id = %batch.id,
            batch_type = %batch.batch_type,
            total_jobs = batch.total_jobs,
            "Created batch"
        );
        Ok(batch)
    }
}

/// Deletes a batch with its job definitions and every job still left.
#[derive(Debug, Clone)]
pub struct DeleteBatchCmd {
    /// Batch to delete.
    pub batch_id: BatchId,
}

#[async_trait]
impl Command for DeleteBatchCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let batch: Batch = ctx.get(self.batch_id.into_uuid()).await?;
        ctx.require_authorization(on_batch(Permission::Delete, batch.id));

        let jobs = ctx
            .list(JobQuery::new().job_definition_ids(definition_ids(&batch).to_vec()))
            .await?;
        if !jobs.is_empty() {
            let incidents = ctx
                .list(IncidentQuery::new().job_ids(jobs.iter().map(|job| job.id).collect()))
                .await?;
            for incident in &incidents {
                ctx.delete(incident);
            }
        }
        for job in &jobs {
            ctx.delete(job);
        }

        for definition_id in definition_ids(&batch) {
            if let Some(definition) = ctx.find::<JobDefinition>(definition_id.into_uuid()).await? {
                ctx.delete(&definition);
            }
        }
        ctx.delete(&batch);

        info!(batch_id = %batch.id, jobs = jobs.len(), "Deleted batch");
        Ok(())
    }
}

/// Suspends or activates a batch together with its job definitions and jobs.
#[derive(Debug, Clone)]
pub struct SetBatchSuspensionCmd {
    /// Batch to change.
    pub batch_id: BatchId,
    /// Target state.
    pub suspended: bool,
}

#[async_trait]
impl Command for SetBatchSuspensionCmd {
    type Output = ();

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<()> {
        let mut batch: Batch = ctx.get(self.batch_id.into_uuid()).await?;
        ctx.require_authorization(on_batch(Permission::Update, batch.id));
        if batch.suspended == self.suspended {
            return Ok(());
        }

        for definition_id in definition_ids(&batch) {
            if let Some(mut definition) =
                ctx.find::<JobDefinition>(definition_id.into_uuid()).await?
            {
                definition.suspended = self.suspended;
                ctx.update(definition)?;
            }
        }

        let jobs = ctx
            .list(JobQuery::new().job_definition_ids(definition_ids(&batch).to_vec()))
            .await?;
        for mut job in jobs {
            job.suspended = self.suspended;
            ctx.update(job)?;
        }

        batch.suspended = self.suspended;
        ctx.update(batch)
    }
}

/// Batches matching a query.
#[derive(Debug, Clone)]
pub struct FindBatchesCmd {
    /// Filter.
    pub query: BatchQuery,
}

#[async_trait]
impl Command for FindBatchesCmd {
    type Output = Vec<Batch>;

    async fn execute(&self, ctx: &mut CommandContext) -> AppResult<Vec<Batch>> {
        ctx.require_authorization(CompositePermissionCheck::atomic(
            Permission::Read,
            Resource::Batch,
            ANY,
        ));
        ctx.list(self.query.clone()).await
    }

    fn retryable(&self) -> bool {
        false
    }
}

/// Creates and administers batches.
#[derive(Debug, Clone)]
pub struct BatchManager {
    commands: CommandExecutor,
    handlers: Arc<BatchHandlerRegistry>,
    config: BatchConfig,
    default_retries: i32,
    hint: Option<Arc<Notify>>,
    caller: Option<Authentication>,
}

impl BatchManager {
    /// Creates a new batch manager.
    pub fn new(
        commands: CommandExecutor,
        handlers: BatchHandlerRegistry,
        config: BatchConfig,
        default_retries: i32,
    ) -> Self {
        for batch_type in config.invocations_per_batch_job_by_type.keys() {
            if !handlers.contains(batch_type) {
                warn!(
                    "Invocations per batch job configured for unknown batch type '{}'",
                    batch_type
                );
            }
        }

        Self {
            commands,
            handlers: Arc::new(handlers),
            config,
            default_retries,
            hint: None,
            caller: None,
        }
    }

    /// Wake the acquisition loop through `hint` when a batch is created.
    pub fn with_hint(mut self, hint: Arc<Notify>) -> Self {
        self.hint = Some(hint);
        self
    }

    /// A copy of the manager that runs every operation as `caller`.
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

    /// Elements handled by one execution job of `batch_type`.
    pub fn invocations_for(&self, batch_type: &str) -> u32 {
        self.config
            .invocations_per_batch_job_by_type
            .get(batch_type)
            .copied()
            .unwrap_or(self.config.invocations_per_batch_job)
            .max(1)
    }

    /// Register the seed, monitor, and execution handlers of every batch type.
    pub fn register_handlers(&self, registry: &mut JobHandlerRegistry) {
        registry.register(Arc::new(SeedJobHandler::new(self.default_retries)));
        registry.register(Arc::new(MonitorJobHandler::new(Duration::from_secs(
            self.config.poll_time_seconds,
        ))));
        for handler in self.handlers.handlers() {
            registry.register(Arc::new(BatchExecutionJobHandler::new(Arc::clone(handler))));
        }
    }

    /// Create a batch of `batch_type` over the selected elements.
    pub async fn create_batch(
        &self,
        batch_type: &str,
        selector: ElementSelector,
        payload: serde_json::Value,
    ) -> AppResult<Batch> {
        self.run(&CreateBatchCmd {
            batch_type: batch_type.to_string(),
            selector,
            payload,
            invocations_per_batch_job: self.invocations_for(batch_type),
            batch_jobs_per_seed: self.config.batch_jobs_per_seed,
            default_retries: self.default_retries,
            handlers: Arc::clone(&self.handlers),
            hint: self.hint.clone(),
        })
        .await
    }

    /// Delete a batch and everything it still owns.
    pub async fn delete_batch(&self, batch_id: BatchId) -> AppResult<()> {
        self.run(&DeleteBatchCmd { batch_id }).await
    }

    /// Suspend a batch and its jobs.
    pub async fn suspend_batch(&self, batch_id: BatchId) -> AppResult<()> {
        self.run(&SetBatchSuspensionCmd {
            batch_id,
            suspended: true,
        })
        .await
    }

    /// Activate a suspended batch and its jobs.
    pub async fn activate_batch(&self, batch_id: BatchId) -> AppResult<()> {
        self.run(&SetBatchSuspensionCmd {
            batch_id,
            suspended: false,
        })
        .await
    }

    /// Batches matching `query`.
    pub async fn batches(&self, query: BatchQuery) -> AppResult<Vec<Batch>> {
        self.run(&FindBatchesCmd { query }).await
    }
}
