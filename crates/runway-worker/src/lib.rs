//! Background job execution for Runway.
//!
//! This crate provides:
//! - The job handler contract and a registry keyed by job type
//! - A job executor that claims due jobs under a lease and runs them on a
//!   bounded worker pool
//! - Failure handling with retry counters, backoff, and incidents
//! - Administrative job commands and the job service facade

pub mod backoff;
pub mod execution;
pub mod executor;
pub mod handler;
pub mod management;
pub mod service;

pub use backoff::{AcquisitionBackoff, RetryBackoff};
pub use execution::{ExecuteJobCmd, FailureOutcome, HandleJobFailureCmd, JobOutcome};
pub use executor::JobExecutor;
pub use handler::{JobExecutionContext, JobHandler, JobHandlerRegistry};
pub use service::JobService;
