//! Monitor job: completes a batch once its execution jobs are gone.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use runway_command::CommandContext;
use runway_core::AppResult;
use runway_core::types::BatchId;
use runway_database::JobQuery;
use runway_entity::batch::Batch;
use runway_entity::job::JobDefinition;
use runway_worker::{JobExecutionContext, JobHandler};

use crate::handler::decode;

/// Job type of monitor jobs.
pub const MONITOR_JOB_TYPE: &str = "batch-monitor-job";

/// Polls a seeded batch until no execution job remains, then completes it.
#[derive(Debug, Clone)]
pub struct MonitorJobHandler {
    poll_interval: Duration,
}

impl MonitorJobHandler {
    /// Create a monitor handler that re-checks every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl JobHandler for MonitorJobHandler {
    fn job_type(&self) -> &str {
        MONITOR_JOB_TYPE
    }

    async fn execute(
        &self,
        configuration: &[u8],
        execution: &mut JobExecutionContext,
        ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        let batch_id: BatchId = decode(configuration)?;
        let Some(mut batch) = ctx.find::<Batch>(batch_id.into_uuid()).await? else {
            debug!(batch_id = %batch_id, "Batch was deleted, stopping monitor");
            return Ok(());
        };

        let remaining = ctx
            .list(JobQuery::new().job_definition_id(batch.batch_job_definition_id))
            .await?
            .len();

        if !batch.is_seeded() || remaining > 0 {
            let now = ctx.now();
            let due = chrono::Duration::from_std(self.poll_interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now);
            debug!(batch_id = %batch.id, remaining, "Batch still running");
            execution.reschedule(due);
            return Ok(());
        }

        for definition_id in [
            batch.seed_job_definition_id,
            batch.monitor_job_definition_id,
            batch.batch_job_definition_id,
        ] {
            if let Some(definition) = ctx.find::<JobDefinition>(definition_id.into_uuid()).await? {
                ctx.delete(&definition);
            }
        }

        batch.completed_at = Some(ctx.now());
        batch.configuration = None;
        info!(batch_id = %batch.id, batch_type = %batch.batch_type, "Batch completed");
        ctx.update(batch)
    }
}
