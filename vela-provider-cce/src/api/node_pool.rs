//! CCE v3 node-pool objects and calls

use serde::{Deserialize, Serialize};

use super::Metadata;
use super::node::NodeSpec;
use crate::client::{ApiResult, ServiceClient};

/// Server-side sentinel meaning "runtime not recorded"; read as `docker`
pub const RUNTIME_NULL_SENTINEL: &str = "null";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePool {
    pub metadata: Metadata,
    pub spec: NodePoolSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodePoolStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePoolSpec {
    /// Always `vm` today
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub pool_type: Option<String>,
    #[serde(rename = "nodeTemplate", default)]
    pub node_template: NodeSpec,
    #[serde(rename = "initialNodeCount", default)]
    pub initial_node_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<Autoscaling>,
    #[serde(
        rename = "nodeManagement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub node_management: Option<NodeManagement>,
}

/// Placement management for the pool's servers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeManagement {
    #[serde(
        rename = "serverGroupReference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_group_reference: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Autoscaling {
    #[serde(default)]
    pub enable: bool,
    #[serde(rename = "minNodeCount", default)]
    pub min_node_count: i64,
    #[serde(rename = "maxNodeCount", default)]
    pub max_node_count: i64,
    #[serde(rename = "scaleDownCooldownTime", default)]
    pub scale_down_cooldown_time: i64,
    #[serde(default)]
    pub priority: i64,
}

/// The cloud expresses "steady" as an absent/empty phase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePoolStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(
        rename = "currentNode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_node: Option<i64>,
}

pub async fn get(client: &ServiceClient, cluster_id: &str, pool_id: &str) -> ApiResult<NodePool> {
    client
        .get(&format!("clusters/{}/nodepools/{}", cluster_id, pool_id))
        .await
}

pub async fn create(
    client: &ServiceClient,
    cluster_id: &str,
    pool: &NodePool,
) -> ApiResult<NodePool> {
    client
        .post(&format!("clusters/{}/nodepools", cluster_id), pool)
        .await
}

pub async fn update(
    client: &ServiceClient,
    cluster_id: &str,
    pool_id: &str,
    pool: &NodePool,
) -> ApiResult<NodePool> {
    client
        .put(
            &format!("clusters/{}/nodepools/{}", cluster_id, pool_id),
            pool,
        )
        .await
}

pub async fn delete(client: &ServiceClient, cluster_id: &str, pool_id: &str) -> ApiResult<()> {
    client
        .delete(&format!("clusters/{}/nodepools/{}", cluster_id, pool_id))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_pool_deserialises_with_empty_phase() {
        let raw = serde_json::json!({
            "metadata": { "name": "pool-1", "uid": "np-1" },
            "spec": {
                "initialNodeCount": 1,
                "autoscaling": { "enable": true, "minNodeCount": 1, "maxNodeCount": 3 }
            },
            "status": { "currentNode": 1 }
        });

        let pool: NodePool = serde_json::from_value(raw).unwrap();
        assert_eq!(pool.status.as_ref().unwrap().phase, "");
        assert_eq!(pool.spec.autoscaling.as_ref().unwrap().max_node_count, 3);
    }
}
