//! Job executor configuration.

use serde::{Deserialize, Serialize};

/// Background job executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutorConfig {
    /// Whether the acquisition loop is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lock owner name; a random one is generated when unset.
    #[serde(default)]
    pub lock_owner: Option<String>,
    /// Number of worker tasks executing claimed jobs.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Capacity of the queue between acquisition and the workers.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Maximum number of jobs claimed per acquisition.
    #[serde(default = "default_max_jobs_per_acquisition")]
    pub max_jobs_per_acquisition: usize,
    /// Lease length in milliseconds.
    #[serde(default = "default_lock_time")]
    pub lock_time_ms: u64,
    /// Base wait between acquisitions in milliseconds.
    #[serde(default = "default_wait_time")]
    pub wait_time_ms: u64,
    /// Ceiling of the acquisition wait in milliseconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
    /// Multiplier applied to the wait after an empty acquisition.
    #[serde(default = "default_wait_increase_factor")]
    pub wait_increase_factor: u32,
    /// Retries given to newly created jobs and used by retry resets.
    #[serde(default = "default_retries")]
    pub default_retries: i32,
    /// Only acquire jobs of registered deployments (or with no deployment).
    #[serde(default)]
    pub deployment_aware: bool,
    /// Lowest job priority acquired by this executor.
    #[serde(default)]
    pub priority_min: Option<i64>,
    /// Highest job priority acquired by this executor.
    #[serde(default)]
    pub priority_max: Option<i64>,
    /// Delay applied before a failed job becomes due again.
    #[serde(default)]
    pub retry_backoff: RetryBackoffConfig,
}

/// Failed-job retry delay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoffConfig {
    /// `"fixed"` or `"exponential"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Delay of the first retry in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Exponential growth factor.
    #[serde(default = "default_backoff_factor")]
    pub factor: u32,
    /// Delay ceiling in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: u64,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_owner: None,
            worker_count: default_worker_count(),
            queue_size: default_queue_size(),
            max_jobs_per_acquisition: default_max_jobs_per_acquisition(),
            lock_time_ms: default_lock_time(),
            wait_time_ms: default_wait_time(),
            max_wait_ms: default_max_wait(),
            wait_increase_factor: default_wait_increase_factor(),
            default_retries: default_retries(),
            deployment_aware: false,
            priority_min: None,
            priority_max: None,
            retry_backoff: RetryBackoffConfig::default(),
        }
    }
}

impl Default for RetryBackoffConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            base_delay_seconds: default_base_delay(),
            factor: default_backoff_factor(),
            max_delay_seconds: default_max_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_worker_count() -> usize {
    3
}

fn default_queue_size() -> usize {
    3
}

fn default_max_jobs_per_acquisition() -> usize {
    3
}

fn default_lock_time() -> u64 {
    300_000
}

fn default_wait_time() -> u64 {
    5_000
}

fn default_max_wait() -> u64 {
    60_000
}

fn default_wait_increase_factor() -> u32 {
    2
}

fn default_retries() -> i32 {
    3
}

fn default_strategy() -> String {
    "fixed".to_string()
}

fn default_base_delay() -> u64 {
    0
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_max_delay() -> u64 {
    3_600
}
