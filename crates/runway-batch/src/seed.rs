//! Seed job: creates a batch's execution jobs in bounded rounds.

use async_trait::async_trait;
use tracing::{debug, info};

use runway_command::CommandContext;
use runway_core::AppResult;
use runway_core::types::BatchId;
use runway_entity::batch::{Batch, BatchJobConfiguration};
use runway_entity::job::Job;
use runway_worker::{JobExecutionContext, JobHandler};

use crate::handler::{batch_configuration, decode, encode};
use crate::monitor::MONITOR_JOB_TYPE;
use crate::planning::plan_chunks;

/// Job type of seed jobs.
pub const SEED_JOB_TYPE: &str = "batch-seed-job";

/// Creates up to `batch_jobs_per_seed` execution jobs per run and
/// reschedules itself until the batch is fully seeded; then hands over to
/// the monitor job.
#[derive(Debug, Clone)]
pub struct SeedJobHandler {
    default_retries: i32,
}

impl SeedJobHandler {
    /// Create a seed handler whose execution jobs start with `default_retries`.
    pub fn new(default_retries: i32) -> Self {
        Self { default_retries }
    }
}

#[async_trait]
impl JobHandler for SeedJobHandler {
    fn job_type(&self) -> &str {
        SEED_JOB_TYPE
    }

    async fn execute(
        &self,
        configuration: &[u8],
        execution: &mut JobExecutionContext,
        ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        let batch_id: BatchId = decode(configuration)?;
        let mut batch: Batch = ctx.get(batch_id.into_uuid()).await?;
        let now = ctx.now();

        if !batch.is_seeded() {
            let chunks =
                plan_chunks(&batch_configuration(&batch)?, batch.invocations_per_batch_job);
            let start = batch.jobs_created as usize;
            let end = (start + batch.batch_jobs_per_seed.max(1) as usize).min(chunks.len());

            for chunk in &chunks[start..end] {
                let job_configuration = BatchJobConfiguration {
                    batch_id: batch.id,
                    ids: chunk.ids.clone(),
                };
                let mut job = Job::new(
                    batch.batch_type.clone(),
                    encode(&job_configuration)?,
                    self.default_retries,
                    now,
                )
                .with_definition(batch.batch_job_definition_id);
                job.created_at = now;
                job.deployment_id = chunk.deployment_id.clone();
                job.tenant_id = batch.tenant_id.clone();
                job.suspended = batch.suspended;
                ctx.insert(job)?;
            }

            batch.jobs_created = end as u32;
            debug!(
                batch_id = %batch.id,
                jobs_created = batch.jobs_created,
                total_jobs = batch.total_jobs,
                "Seeded batch jobs"
            );
        }

        if batch.is_seeded() {
            let mut monitor = Job::new(
                MONITOR_JOB_TYPE,
                encode(&batch.id)?,
                self.default_retries,
                now,
            )
            .with_definition(batch.monitor_job_definition_id);
            monitor.created_at = now;
            monitor.tenant_id = batch.tenant_id.clone();
            monitor.suspended = batch.suspended;
            ctx.insert(monitor)?;
            info!(
                batch_id = %batch.id,
                total_jobs = batch.total_jobs,
                "Batch fully seeded, monitor created"
            );
        } else {
            execution.reschedule(now);
        }

        ctx.update(batch)
    }
}
