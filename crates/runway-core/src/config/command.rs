//! Command pipeline configuration.

use serde::{Deserialize, Serialize};

/// Settings for the command interceptor chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// How many times a command is re-executed after a concurrent-modification
    /// conflict before the conflict is surfaced.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Whether authorization checks registered by commands are enforced.
    #[serde(default = "default_true")]
    pub authorization_enabled: bool,
    /// Users that bypass every authorization check.
    #[serde(default)]
    pub admin_users: Vec<String>,
    /// Groups whose members bypass every authorization check.
    #[serde(default = "default_admin_groups")]
    pub admin_groups: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            authorization_enabled: true,
            admin_users: Vec::new(),
            admin_groups: default_admin_groups(),
        }
    }
}

fn default_retry_budget() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_admin_groups() -> Vec<String> {
    vec!["runway-admin".to_string()]
}
