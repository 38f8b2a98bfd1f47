//! CCE v3 cluster objects and calls

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::client::{ApiResult, ServiceClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default = "kind_cluster")]
    pub kind: String,
    #[serde(rename = "apiVersion", default = "api_v3")]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: ClusterSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

fn kind_cluster() -> String {
    "Cluster".to_string()
}

fn api_v3() -> String {
    "v3".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// `VirtualMachine`, `ARM64` or `BareMetal`
    #[serde(rename = "type", default)]
    pub cluster_type: String,
    #[serde(default)]
    pub flavor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "hostNetwork", default)]
    pub host_network: HostNetwork,
    #[serde(rename = "containerNetwork", default)]
    pub container_network: ContainerNetwork,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    #[serde(
        rename = "kubernetesSvcIpRange",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kubernetes_svc_ip_range: Option<String>,
    #[serde(rename = "billingMode", default)]
    pub billing_mode: i64,
    #[serde(
        rename = "extendParam",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub extend_params: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostNetwork {
    #[serde(default)]
    pub vpc: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(
        rename = "highwaySubnet",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub highway_subnet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerNetwork {
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(default)]
    pub mode: String,
    #[serde(
        rename = "authenticatingProxy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authenticating_proxy: Option<AuthenticatingProxy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthenticatingProxy {
    /// Base64-encoded CA certificate
    #[serde(default)]
    pub ca: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(rename = "jobID", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
}

/// Control-plane endpoints; `external` is a full URL whose hostname is the
/// bound floating IP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<String>,
}

/// Certificate bundle returned by the clustercert endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateBundle {
    #[serde(default)]
    pub clusters: Vec<CertificateCluster>,
    #[serde(default)]
    pub users: Vec<CertificateUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateCluster {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster: CertificateClusterData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateClusterData {
    #[serde(default)]
    pub server: String,
    #[serde(rename = "certificate-authority-data", default)]
    pub certificate_authority_data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user: CertificateUserData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateUserData {
    #[serde(rename = "client-certificate-data", default)]
    pub client_certificate_data: String,
    #[serde(rename = "client-key-data", default)]
    pub client_key_data: String,
}

/// Master floating-IP bind/unbind request
#[derive(Debug, Clone, Serialize)]
pub struct MasterEipRequest {
    pub spec: MasterEipSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterEipSpec {
    /// `bind` or `unbind`
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<MasterEipTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterEipTarget {
    /// Floating-IP identifier
    pub id: String,
}

pub async fn get(client: &ServiceClient, cluster_id: &str) -> ApiResult<Cluster> {
    client.get(&format!("clusters/{}", cluster_id)).await
}

pub async fn create(client: &ServiceClient, cluster: &Cluster) -> ApiResult<Cluster> {
    client.post("clusters", cluster).await
}

pub async fn update_description(
    client: &ServiceClient,
    cluster_id: &str,
    description: &str,
) -> ApiResult<Cluster> {
    let body = serde_json::json!({ "spec": { "description": description } });
    client
        .put(&format!("clusters/{}", cluster_id), &body)
        .await
}

pub async fn delete(client: &ServiceClient, cluster_id: &str) -> ApiResult<()> {
    client.delete(&format!("clusters/{}", cluster_id)).await
}

pub async fn certificates(
    client: &ServiceClient,
    cluster_id: &str,
) -> ApiResult<CertificateBundle> {
    client
        .get(&format!("clusters/{}/clustercert", cluster_id))
        .await
}

/// Bind or unbind the master floating IP
pub async fn master_eip(
    client: &ServiceClient,
    cluster_id: &str,
    action: &str,
    eip_id: Option<&str>,
) -> ApiResult<serde_json::Value> {
    let request = MasterEipRequest {
        spec: MasterEipSpec {
            action: action.to_string(),
            spec: eip_id.map(|id| MasterEipTarget { id: id.to_string() }),
        },
    };
    client
        .put(&format!("clusters/{}/mastereip", cluster_id), &request)
        .await
}
