//! CCE v1 kubernetes node objects
//!
//! The v3 node object omits user-facing labels and taints; the v1 kubernetes
//! node carries them but is addressed by private IP under its cluster. This
//! module is the cross-version adapter the node controller reads through.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::client::{ApiResult, ServiceClient};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sNode {
    #[serde(default)]
    pub metadata: K8sMetadata,
    #[serde(default)]
    pub spec: K8sNodeSpec,
    #[serde(default)]
    pub status: K8sNodeStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sNodeSpec {
    #[serde(default)]
    pub taints: Vec<K8sTaint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sTaint {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub effect: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sNodeStatus {
    #[serde(default)]
    pub addresses: Vec<K8sAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sAddress {
    #[serde(rename = "type", default)]
    pub address_type: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct K8sNodeList {
    #[serde(default)]
    pub items: Vec<K8sNode>,
}

pub async fn list_nodes(client: &ServiceClient, cluster_id: &str) -> ApiResult<K8sNodeList> {
    client.get(&format!("clusters/{}/nodes", cluster_id)).await
}

/// Pick the node whose InternalIP address matches `private_ip`
pub fn find_by_private_ip(list: &K8sNodeList, private_ip: &str) -> Option<K8sNode> {
    list.items
        .iter()
        .find(|node| {
            node.status
                .addresses
                .iter()
                .any(|a| a.address_type == "InternalIP" && a.address == private_ip)
        })
        .cloned()
}
