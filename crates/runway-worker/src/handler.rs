//! Job handlers and the handler registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use runway_command::CommandContext;
use runway_core::{AppError, AppResult};
use runway_entity::job::Job;

/// Per-execution view of the job handed to a handler.
#[derive(Debug, Clone)]
pub struct JobExecutionContext {
    job: Job,
    reschedule_at: Option<DateTime<Utc>>,
}

impl JobExecutionContext {
    /// Wrap the job being executed.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            reschedule_at: None,
        }
    }

    /// The job as it was when execution started.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Keep the job and run it again at `due_date` instead of deleting it
    /// once the handler succeeds.
    pub fn reschedule(&mut self, due_date: DateTime<Utc>) {
        self.reschedule_at = Some(due_date);
    }

    /// Due date requested through [`Self::reschedule`].
    pub fn rescheduled_at(&self) -> Option<DateTime<Utc>> {
        self.reschedule_at
    }
}

/// Behaviour for one job type.
///
/// Handlers are stateless and may run more than once for the same job when a
/// lease expires mid-execution.
#[async_trait]
pub trait JobHandler: Send + Sync + fmt::Debug {
    /// Job type this handler executes.
    fn job_type(&self) -> &str;

    /// Execute the job inside the command context of its transaction.
    async fn execute(
        &self,
        configuration: &[u8],
        execution: &mut JobExecutionContext,
        ctx: &mut CommandContext,
        tenant_id: Option<&str>,
    ) -> AppResult<()>;
}

/// Handlers keyed by job type.
#[derive(Debug, Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler of the same type.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        info!("Registered job handler for type '{}'", job_type);
        self.handlers.insert(job_type, handler);
    }

    /// Handler for `job_type`; a missing handler is a configuration error.
    pub fn get(&self, job_type: &str) -> AppResult<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned().ok_or_else(|| {
            AppError::configuration(format!("No job handler registered for type '{job_type}'"))
        })
    }

    /// Registered job types.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
