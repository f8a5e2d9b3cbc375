//! Batch planning.
//!
//! Elements are grouped by deployment before they are split into execution
//! jobs, so one execution job never spans two deployments. Partitions are
//! ordered by deployment id with elements without a deployment last. The
//! plan is a pure function of the stored [`BatchConfiguration`] and the
//! invocation count, so the seed job can recompute it on every run.

use std::collections::BTreeMap;

use runway_entity::batch::{BatchConfiguration, BatchElement, DeploymentMapping};

/// Group `elements` by deployment and build the batch configuration.
pub fn group_by_deployment(
    elements: Vec<BatchElement>,
    payload: serde_json::Value,
) -> BatchConfiguration {
    let mut by_deployment: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut unmapped = Vec::new();
    for element in elements {
        match element.deployment_id {
            Some(deployment_id) => by_deployment.entry(deployment_id).or_default().push(element.id),
            None => unmapped.push(element.id),
        }
    }

    let mut ids = Vec::new();
    let mut id_mappings = Vec::new();
    for (deployment_id, group) in by_deployment {
        id_mappings.push(DeploymentMapping {
            deployment_id: Some(deployment_id),
            count: group.len(),
        });
        ids.extend(group);
    }
    if !unmapped.is_empty() {
        id_mappings.push(DeploymentMapping {
            deployment_id: None,
            count: unmapped.len(),
        });
        ids.extend(unmapped);
    }

    BatchConfiguration {
        ids,
        id_mappings,
        payload,
    }
}

/// One planned execution job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deployment of every element in the chunk.
    pub deployment_id: Option<String>,
    /// Element ids.
    pub ids: Vec<String>,
}

/// Split the configuration into execution jobs of at most `invocations`
/// elements each.
pub fn plan_chunks(configuration: &BatchConfiguration, invocations: u32) -> Vec<Chunk> {
    let size = invocations.max(1) as usize;
    let mut chunks = Vec::new();
    let mut offset = 0;

    for mapping in &configuration.id_mappings {
        let end = (offset + mapping.count).min(configuration.ids.len());
        let partition = &configuration.ids[offset.min(end)..end];
        for ids in partition.chunks(size) {
            chunks.push(Chunk {
                deployment_id: mapping.deployment_id.clone(),
                ids: ids.to_vec(),
            });
        }
        offset = end;
    }
    chunks
}
