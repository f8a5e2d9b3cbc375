//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use runway_auth::{AuthorizationManager, AuthorizationService};
use runway_batch::{BatchHandlerRegistry, BatchManager, SetJobRetriesBatchHandler};
use runway_command::{CommandContext, CommandExecutor};
use runway_core::config::AppConfig;
use runway_core::{AppError, AppResult, ManualClock};
use runway_database::MemoryDatastore;
use runway_worker::{JobExecutionContext, JobExecutor, JobHandler, JobHandlerRegistry, JobService};

/// Lease owner of the engine's executor.
pub const LOCK_OWNER: &str = "engine-a";

/// A runtime over the in-memory datastore and a manual clock.
pub struct TestEngine {
    /// Shared datastore.
    pub datastore: MemoryDatastore,
    /// Engine clock.
    pub clock: ManualClock,
    /// Command executor with authorization enabled.
    pub commands: CommandExecutor,
    /// Job executor, driven by [`TestEngine::run_until_idle`].
    pub executor: JobExecutor,
    /// Job facade.
    pub jobs: JobService,
    /// Batch facade.
    pub batches: BatchManager,
    /// Authorization facade.
    pub authorizations: AuthorizationService,
    /// Configuration the engine was built from.
    pub config: AppConfig,
}

impl TestEngine {
    /// Engine with default configuration and no extra handlers.
    pub fn new() -> Self {
        Self::build(test_config(), Vec::new())
    }

    /// Engine with one extra job handler.
    pub fn with_handler(handler: Arc<dyn JobHandler>) -> Self {
        Self::build(test_config(), vec![handler])
    }

    /// Engine from an explicit configuration.
    pub fn build(config: AppConfig, handlers: Vec<Arc<dyn JobHandler>>) -> Self {
        let datastore = MemoryDatastore::new();
        let clock = ManualClock::default();

        let manager = Arc::new(AuthorizationManager::new(&config.command));
        let commands =
            CommandExecutor::builder(Arc::new(datastore.clone()), Arc::new(clock.clone()))
                .config(config.command.clone())
                .authorization_checker(Arc::clone(&manager) as _)
                .build();

        let mut batch_handlers = BatchHandlerRegistry::new();
        batch_handlers.register(Arc::new(SetJobRetriesBatchHandler));
        let batches = BatchManager::new(
            commands.clone(),
            batch_handlers,
            config.batch.clone(),
            config.job_executor.default_retries,
        );

        let mut registry = JobHandlerRegistry::new();
        batches.register_handlers(&mut registry);
        for handler in handlers {
            registry.register(handler);
        }

        let executor = JobExecutor::new(
            Arc::new(datastore.clone()),
            commands.clone(),
            Arc::new(registry),
            Arc::new(clock.clone()),
            config.job_executor.clone(),
        )
        .expect("executor config is valid");

        let jobs = JobService::new(commands.clone(), config.job_executor.default_retries)
            .with_hint(executor.hint());
        let batches = batches.with_hint(executor.hint());
        let authorizations = AuthorizationService::new(commands.clone(), manager);

        Self {
            datastore,
            clock,
            commands,
            executor,
            jobs,
            batches,
            authorizations,
            config,
        }
    }

    /// A second executor over the same datastore with its own lease owner.
    pub fn executor_for(&self, lock_owner: &str, registry: JobHandlerRegistry) -> JobExecutor {
        let mut config = self.config.job_executor.clone();
        config.lock_owner = Some(lock_owner.to_string());
        JobExecutor::new(
            Arc::new(self.datastore.clone()),
            self.commands.clone(),
            Arc::new(registry),
            Arc::new(self.clock.clone()),
            config,
        )
        .expect("executor config is valid")
    }

    /// Run acquisition rounds until a round claims nothing. Returns the
    /// number of jobs claimed overall.
    pub async fn run_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..10_000 {
            let claimed = self
                .executor
                .process_due_jobs()
                .await
                .expect("acquisition round succeeds");
            if claimed == 0 {
                return total;
            }
            total += claimed;
        }
        panic!("engine did not become idle");
    }
}

/// Default configuration with a fixed lease owner and no retry delay.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.job_executor.lock_owner = Some(LOCK_OWNER.to_string());
    config.job_executor.max_jobs_per_acquisition = 10;
    config
}

/// Handler that counts its executions and fails every one of them.
#[derive(Debug, Default)]
pub struct FailingHandler {
    pub executions: AtomicUsize,
}

impl FailingHandler {
    pub fn count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FailingHandler {
    fn job_type(&self) -> &str {
        "always-fails"
    }

    async fn execute(
        &self,
        _configuration: &[u8],
        _execution: &mut JobExecutionContext,
        _ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Err(AppError::internal("handler exploded"))
    }
}

/// Handler that counts its executions and succeeds.
#[derive(Debug, Default)]
pub struct CountingHandler {
    pub executions: AtomicUsize,
}

impl CountingHandler {
    pub fn count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn job_type(&self) -> &str {
        "counting"
    }

    async fn execute(
        &self,
        _configuration: &[u8],
        _execution: &mut JobExecutionContext,
        _ctx: &mut CommandContext,
        _tenant_id: Option<&str>,
    ) -> AppResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
