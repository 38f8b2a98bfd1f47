//! CCE v3 node objects and calls

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::client::{ApiResult, ServiceClient};

/// Volume metadata key carrying the KMS key id
pub const KMS_ID_KEY: &str = "__system__cmkid";
/// Volume metadata key marking the volume encrypted; must be "1" whenever
/// a KMS key id is present
pub const KMS_ENCRYPTED_KEY: &str = "__system__encrypted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub metadata: Metadata,
    pub spec: NodeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub flavor: String,
    #[serde(default)]
    pub az: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default)]
    pub login: Login,
    #[serde(rename = "rootVolume", default)]
    pub root_volume: Volume,
    #[serde(rename = "dataVolumes", default)]
    pub data_volumes: Vec<Volume>,
    #[serde(rename = "publicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIpSpec>,
    #[serde(
        rename = "nodeNicSpec",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub nic: Option<NodeNicSpec>,
    #[serde(
        rename = "ecsGroupId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ecs_group_id: Option<String>,
    #[serde(rename = "billingMode", default)]
    pub billing_mode: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(
        rename = "extendParam",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub extend_params: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Runtime>,
    #[serde(rename = "k8sTags", default, skip_serializing_if = "HashMap::is_empty")]
    pub k8s_tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    #[serde(rename = "userTags", default, skip_serializing_if = "Vec::is_empty")]
    pub user_tags: Vec<UserTag>,
}

/// Exactly one of `ssh_key` / `user_password` is set; the schema layer
/// rejects anything else before a request is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Login {
    #[serde(rename = "sshKey", default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(
        rename = "userPassword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_password: Option<UserPassword>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPassword {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub size: i64,
    #[serde(rename = "volumetype", default)]
    pub volume_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl Volume {
    /// Attach KMS encryption metadata to this volume
    pub fn with_kms_id(mut self, kms_id: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(KMS_ID_KEY.to_string(), kms_id.to_string());
        metadata.insert(KMS_ENCRYPTED_KEY.to_string(), "1".to_string());
        self.metadata = Some(metadata);
        self
    }

    /// Lift the KMS key id out of the metadata map, rejecting inconsistent
    /// responses where the id is present but the encrypted sentinel is not
    pub fn kms_id(&self) -> Result<Option<&str>, String> {
        let Some(metadata) = &self.metadata else {
            return Ok(None);
        };
        match metadata.get(KMS_ID_KEY) {
            None => Ok(None),
            Some(id) => {
                if metadata.get(KMS_ENCRYPTED_KEY).map(String::as_str) == Some("1") {
                    Ok(Some(id))
                } else {
                    Err(format!(
                        "volume carries {} but {} is not \"1\"",
                        KMS_ID_KEY, KMS_ENCRYPTED_KEY
                    ))
                }
            }
        }
    }
}

/// Either a list of pre-allocated floating-IP ids, or an inline allocation
/// recipe; never both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicIpSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip: Option<EipAllocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EipAllocation {
    #[serde(default)]
    pub iptype: String,
    #[serde(default)]
    pub bandwidth: BandwidthAllocation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandwidthAllocation {
    #[serde(default)]
    pub size: i64,
    #[serde(rename = "sharetype", default)]
    pub share_type: String,
    #[serde(rename = "chargemode", default)]
    pub charge_mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeNicSpec {
    #[serde(rename = "primaryNic", default)]
    pub primary_nic: PrimaryNic,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrimaryNic {
    #[serde(rename = "subnetId", default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(rename = "fixedIps", default, skip_serializing_if = "Option::is_none")]
    pub fixed_ips: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(rename = "serverId", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(
        rename = "privateIP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub private_ip: Option<String>,
    #[serde(rename = "publicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(rename = "jobID", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

pub async fn get(client: &ServiceClient, cluster_id: &str, node_id: &str) -> ApiResult<Node> {
    client
        .get(&format!("clusters/{}/nodes/{}", cluster_id, node_id))
        .await
}

pub async fn create(client: &ServiceClient, cluster_id: &str, node: &Node) -> ApiResult<Node> {
    client
        .post(&format!("clusters/{}/nodes", cluster_id), node)
        .await
}

pub async fn update_name(
    client: &ServiceClient,
    cluster_id: &str,
    node_id: &str,
    name: &str,
) -> ApiResult<Node> {
    let body = serde_json::json!({ "metadata": { "name": name } });
    client
        .put(&format!("clusters/{}/nodes/{}", cluster_id, node_id), &body)
        .await
}

pub async fn delete(client: &ServiceClient, cluster_id: &str, node_id: &str) -> ApiResult<()> {
    client
        .delete(&format!("clusters/{}/nodes/{}", cluster_id, node_id))
        .await
}
