//! Batch job handlers.
//!
//! A [`BatchJobHandler`] processes a slice of a batch's elements. The
//! [`BatchExecutionJobHandler`] adapter exposes it to the job executor under
//! the batch type, decoding the slice from the job and the shared payload
//! from the batch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use runway_command::CommandContext;
use runway_core::{AppError, AppResult};
use runway_entity::batch::{Batch, BatchConfiguration, BatchJobConfiguration};
use runway_worker::{JobExecutionContext, JobHandler};

pub(crate) fn encode<T: Serialize>(value: &T) -> AppResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// The stored configuration of `batch`.
pub fn batch_configuration(batch: &Batch) -> AppResult<BatchConfiguration> {
    let value = batch.configuration.clone().ok_or_else(|| {
        AppError::conflict(format!("Batch {} has no configuration left", batch.id))
    })?;
    Ok(serde_json::from_value(value)?)
}

/// Behaviour of one batch type.
#[async_trait]
pub trait BatchJobHandler: Send + Sync + fmt::Debug {
    /// Batch type handled; also the job type of the execution jobs.
    fn batch_type(&self) -> &str;

    /// Reject a payload before a batch is created.
    fn validate(&self, payload: &serde_json::Value) -> AppResult<()> {
        let _ = payload;
        Ok(())
    }

    /// Process `ids` with the batch-wide `payload`.
    async fn execute(
        &self,
        ids: &[String],
        payload: &serde_json::Value,
        batch: &Batch,
        ctx: &mut CommandContext,
    ) -> AppResult<()>;
}

/// Runs one execution job of a batch.
#[derive(Debug)]
pub struct BatchExecutionJobHandler {
    handler: Arc<dyn BatchJobHandler>,
}

impl BatchExecutionJobHandler {
    /// Wrap a batch handler.
    pub fn new(handler: Arc<dyn BatchJobHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl JobHandler for BatchExecutionJobHandler {
    fn job_type(&self) -> &str {
        self.handler.batch_type()
    }

    async fn execute(
        &self,
        configuration: &[u8],
        _execution: &mut JobExecutionContext,
        ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        let job_configuration: BatchJobConfiguration = decode(configuration)?;
        let batch: Batch = ctx.get(job_configuration.batch_id.into_uuid()).await?;
        let batch_configuration = batch_configuration(&batch)?;

        debug!(
            batch_id = %batch.id,
            batch_type = %batch.batch_type,
            elements = job_configuration.ids.len(),
            "Executing batch job"
        );
        self.handler
            .execute(
                &job_configuration.ids,
                &batch_configuration.payload,
                &batch,
                ctx,
            )
            .await
    }
}

/// Batch handlers keyed by batch type.
#[derive(Debug, Default)]
pub struct BatchHandlerRegistry {
    handlers: HashMap<String, Arc<dyn BatchJobHandler>>,
}

impl BatchHandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch handler.
    pub fn register(&mut self, handler: Arc<dyn BatchJobHandler>) {
        let batch_type = handler.batch_type().to_string();
        info!("Registered batch handler for type '{}'", batch_type);
        self.handlers.insert(batch_type, handler);
    }

    /// Handler for `batch_type`; a missing handler is a configuration error.
    pub fn get(&self, batch_type: &str) -> AppResult<Arc<dyn BatchJobHandler>> {
        self.handlers.get(batch_type).cloned().ok_or_else(|| {
            AppError::configuration(format!("No batch handler registered for type '{batch_type}'"))
        })
    }

    /// Whether a handler is registered for `batch_type`.
    pub fn contains(&self, batch_type: &str) -> bool {
        self.handlers.contains_key(batch_type)
    }

    /// Every registered handler.
    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn BatchJobHandler>> {
        self.handlers.values()
    }
}
