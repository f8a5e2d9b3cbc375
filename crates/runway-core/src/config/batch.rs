//! Batch configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Batch decomposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of execution jobs a seed job creates per run.
    #[serde(default = "default_batch_jobs_per_seed")]
    pub batch_jobs_per_seed: u32,
    /// Default number of elements handled by a single execution job.
    #[serde(default = "default_invocations_per_batch_job")]
    pub invocations_per_batch_job: u32,
    /// Per batch type overrides of `invocations_per_batch_job`.
    #[serde(default)]
    pub invocations_per_batch_job_by_type: HashMap<String, u32>,
    /// Seconds between two polls of a batch monitor job.
    #[serde(default = "default_poll_time")]
    pub poll_time_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_jobs_per_seed: default_batch_jobs_per_seed(),
            invocations_per_batch_job: default_invocations_per_batch_job(),
            invocations_per_batch_job_by_type: HashMap::new(),
            poll_time_seconds: default_poll_time(),
        }
    }
}

fn default_batch_jobs_per_seed() -> u32 {
    100
}

fn default_invocations_per_batch_job() -> u32 {
    1
}

fn default_poll_time() -> u64 {
    30
}
