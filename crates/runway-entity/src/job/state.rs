//! Derived job state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable state of a job, derived from its fields at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Suspended; never acquired until activated.
    Suspended,
    /// Retries exhausted; waiting for an operator.
    Failed,
    /// Claimed by an executor whose lease has not expired.
    Claimed,
    /// Eligible for acquisition.
    Due,
    /// Due date lies in the future.
    Waiting,
}

impl JobState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suspended => "suspended",
            Self::Failed => "failed",
            Self::Claimed => "claimed",
            Self::Due => "due",
            Self::Waiting => "waiting",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
