//! Batch operations for Runway.
//!
//! A batch splits a bulk operation into execution jobs of bounded size. A
//! seed job creates the execution jobs in rounds, and a monitor job
//! completes the batch once every execution job is gone.

pub mod builtin;
pub mod handler;
pub mod manager;
pub mod monitor;
pub mod planning;
pub mod seed;

pub use builtin::{SET_JOB_RETRIES_BATCH_TYPE, SetJobRetriesBatchHandler};
pub use handler::{BatchExecutionJobHandler, BatchHandlerRegistry, BatchJobHandler};
pub use manager::{BatchManager, ElementSelector};
pub use monitor::{MONITOR_JOB_TYPE, MonitorJobHandler};
pub use seed::{SEED_JOB_TYPE, SeedJobHandler};
