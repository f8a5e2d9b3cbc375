//! Resource types that authorizations apply to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use runway_core::AppError;

/// A protected resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resource {
    /// Application access.
    Application,
    /// Authorization records themselves.
    Authorization,
    /// Batches.
    Batch,
    /// Deployments.
    Deployment,
    /// Groups.
    Group,
    /// Jobs.
    Job,
    /// Job definitions.
    JobDefinition,
    /// Process definitions.
    ProcessDefinition,
    /// Process instances.
    ProcessInstance,
    /// Tenants.
    Tenant,
    /// Users.
    User,
}

impl Resource {
    /// Return the resource type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Batch => "BATCH",
            Self::Deployment => "DEPLOYMENT",
            Self::Group => "GROUP",
            Self::Job => "JOB",
            Self::JobDefinition => "JOB_DEFINITION",
            Self::ProcessDefinition => "PROCESS_DEFINITION",
            Self::ProcessInstance => "PROCESS_INSTANCE",
            Self::Tenant => "TENANT",
            Self::User => "USER",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Resource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "APPLICATION" => Ok(Self::Application),
            "AUTHORIZATION" => Ok(Self::Authorization),
            "BATCH" => Ok(Self::Batch),
            "DEPLOYMENT" => Ok(Self::Deployment),
            "GROUP" => Ok(Self::Group),
            "JOB" => Ok(Self::Job),
            "JOB_DEFINITION" => Ok(Self::JobDefinition),
            "PROCESS_DEFINITION" => Ok(Self::ProcessDefinition),
            "PROCESS_INSTANCE" => Ok(Self::ProcessInstance),
            "TENANT" => Ok(Self::Tenant),
            "USER" => Ok(Self::User),
            _ => Err(AppError::validation(format!("Unknown resource type: {s}"))),
        }
    }
}
