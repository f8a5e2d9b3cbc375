//! Runway Server: process automation runtime core
//!
//! Main entry point that wires the runtime crates together and runs the
//! job executor until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use runway_auth::AuthorizationManager;
use runway_batch::{BatchHandlerRegistry, BatchManager, SetJobRetriesBatchHandler};
use runway_command::CommandExecutor;
use runway_core::config::AppConfig;
use runway_core::error::AppError;
use runway_core::{Clock, SystemClock};
use runway_database::{Datastore, MemoryDatastore, PgDatastore};
use runway_worker::{JobExecutor, JobHandlerRegistry};

#[tokio::main]
async fn main() {
    let env = std::env::var("RUNWAY_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Loaded configuration (env: {})", env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Pick the datastore: PostgreSQL when a URL is configured, memory otherwise.
async fn open_datastore(
    config: &AppConfig,
) -> Result<(Arc<dyn Datastore>, Option<PgDatastore>), AppError> {
    if config.database.url.is_empty() {
        tracing::warn!("No database URL configured, using the in-memory datastore");
        return Ok((Arc::new(MemoryDatastore::new()), None));
    }

    let postgres = PgDatastore::connect(&config.database).await?;
    tracing::info!("Database ready");

    Ok((Arc::new(postgres.clone()), Some(postgres)))
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Runway v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Datastore ────────────────────────────────────────
    let (datastore, postgres) = open_datastore(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── Step 2: Command pipeline ─────────────────────────────────
    let authorization = Arc::new(AuthorizationManager::new(&config.command));
    let commands = CommandExecutor::builder(Arc::clone(&datastore), Arc::clone(&clock))
        .config(config.command.clone())
        .authorization_checker(authorization)
        .build();

    // ── Step 3: Batch handlers ───────────────────────────────────
    let mut batch_handlers = BatchHandlerRegistry::new();
    batch_handlers.register(Arc::new(SetJobRetriesBatchHandler));
    let batch_manager = BatchManager::new(
        commands.clone(),
        batch_handlers,
        config.batch.clone(),
        config.job_executor.default_retries,
    );

    let mut registry = JobHandlerRegistry::new();
    batch_manager.register_handlers(&mut registry);
    tracing::info!("Job handlers registered: {:?}", registry.registered_types());

    // ── Step 4: Job executor ─────────────────────────────────────
    let executor = JobExecutor::new(
        Arc::clone(&datastore),
        commands.clone(),
        Arc::new(registry),
        Arc::clone(&clock),
        config.job_executor.clone(),
    )?;

    // ── Step 5: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let executor_handle = if config.job_executor.enabled {
        let executor = executor.clone();
        Some(tokio::spawn(async move { executor.run(shutdown_rx).await }))
    } else {
        tracing::info!("Job executor disabled");
        None
    };

    tracing::info!("Runway started (lock owner: {})", executor.lock_owner());

    // ── Step 6: Wait for shutdown ────────────────────────────────
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = executor_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Job executor stopped with error: {}", e),
            Err(e) => tracing::error!("Job executor task failed: {}", e),
        }
    }

    if let Some(postgres) = postgres {
        postgres.close().await;
    }

    tracing::info!("Runway stopped");
    Ok(())
}
