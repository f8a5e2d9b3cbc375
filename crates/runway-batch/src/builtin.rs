//! Built-in batch types.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use runway_command::CommandContext;
use runway_core::types::JobId;
use runway_core::{AppError, AppResult};
use runway_entity::batch::Batch;
use runway_entity::job::Job;
use runway_worker::management::{RetriesTarget, SetJobRetriesCmd};

use crate::handler::BatchJobHandler;
use crate::manager::{BatchManager, ElementSelector};

/// Batch type that sets the retries of many jobs.
pub const SET_JOB_RETRIES_BATCH_TYPE: &str = "set-job-retries";

/// Payload of a set-job-retries batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetJobRetriesPayload {
    /// New retry count.
    pub retries: i32,
}

impl SetJobRetriesPayload {
    fn parse(payload: &serde_json::Value) -> AppResult<Self> {
        let parsed: Self = serde_json::from_value(payload.clone())?;
        if parsed.retries < 0 {
            return Err(AppError::validation(format!(
                "The number of job retries must be a non-negative integer, got {}",
                parsed.retries
            )));
        }
        Ok(parsed)
    }
}

/// Sets the retries of every job in the slice. Jobs deleted since the batch
/// was created are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetJobRetriesBatchHandler;

#[async_trait]
impl BatchJobHandler for SetJobRetriesBatchHandler {
    fn batch_type(&self) -> &str {
        SET_JOB_RETRIES_BATCH_TYPE
    }

    fn validate(&self, payload: &serde_json::Value) -> AppResult<()> {
        SetJobRetriesPayload::parse(payload).map(|_| ())
    }

    async fn execute(
        &self,
        ids: &[String],
        payload: &serde_json::Value,
        batch: &Batch,
        ctx: &mut CommandContext,
    ) -> AppResult<()> {
        let payload = SetJobRetriesPayload::parse(payload)?;

        for raw in ids {
            let Ok(job_id) = JobId::from_str(raw) else {
                warn!(batch_id = %batch.id, id = %raw, "Skipping malformed job id");
                continue;
            };
            if ctx.find::<Job>(job_id.into_uuid()).await?.is_none() {
                debug!(batch_id = %batch.id, job_id = %job_id, "Job no longer exists, skipping");
                continue;
            }
            ctx.execute(&SetJobRetriesCmd {
                target: RetriesTarget::Job(job_id),
                retries: payload.retries,
            })
            .await?;
        }
        Ok(())
    }
}

impl BatchManager {
    /// Create a set-job-retries batch over the selected jobs.
    pub async fn set_job_retries_async(
        &self,
        selector: ElementSelector,
        retries: i32,
    ) -> AppResult<Batch> {
        self.create_batch(
            SET_JOB_RETRIES_BATCH_TYPE,
            selector,
            serde_json::to_value(SetJobRetriesPayload { retries })?,
        )
        .await
    }
}
