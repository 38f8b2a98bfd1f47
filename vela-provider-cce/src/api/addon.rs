//! CCE v3 add-on instances and templates
//!
//! The add-on API is rooted above the project path and scopes requests by a
//! `cluster_id` query parameter instead.

use serde::{Deserialize, Serialize};

use super::Metadata;
use crate::client::{ApiResult, ServiceClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addon {
    #[serde(default = "kind_addon")]
    pub kind: String,
    #[serde(rename = "apiVersion", default = "api_v3")]
    pub api_version: String,
    pub metadata: Metadata,
    pub spec: AddonSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AddonStatus>,
}

fn kind_addon() -> String {
    "Addon".to_string()
}

fn api_v3() -> String {
    "v3".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonSpec {
    #[serde(rename = "clusterID", default)]
    pub cluster_id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "addonTemplateName", default)]
    pub template_name: String,
    #[serde(default)]
    pub values: AddonValues,
}

/// Typed value blocks; `basic` and `custom` arrive from the host schema as
/// string maps and are coerced before being placed here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonValues {
    #[serde(default)]
    pub basic: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonList {
    #[serde(default)]
    pub items: Vec<Addon>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonTemplateList {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

pub async fn get(client: &ServiceClient, cluster_id: &str, addon_id: &str) -> ApiResult<Addon> {
    client
        .get(&format!("addons/{}?cluster_id={}", addon_id, cluster_id))
        .await
}

pub async fn create(client: &ServiceClient, addon: &Addon) -> ApiResult<Addon> {
    client.post("addons", addon).await
}

pub async fn delete(client: &ServiceClient, cluster_id: &str, addon_id: &str) -> ApiResult<()> {
    client
        .delete(&format!("addons/{}?cluster_id={}", addon_id, cluster_id))
        .await
}

/// All add-on instances installed in a cluster
pub async fn list(client: &ServiceClient, cluster_id: &str) -> ApiResult<AddonList> {
    client
        .get(&format!("addons?cluster_id={}", cluster_id))
        .await
}

/// Template catalogue, optionally narrowed to one template name; fetched for
/// diagnostic context when an install is rejected
pub async fn templates(
    client: &ServiceClient,
    template_name: Option<&str>,
) -> ApiResult<AddonTemplateList> {
    let path = match template_name {
        Some(name) => format!("addontemplates?addon_template_name={}", name),
        None => "addontemplates".to_string(),
    };
    client.get(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addon_serialises_cluster_scoped_spec() {
        let addon = Addon {
            kind: kind_addon(),
            api_version: api_v3(),
            metadata: Metadata::default(),
            spec: AddonSpec {
                cluster_id: "c-1".to_string(),
                version: "1.27.x".to_string(),
                template_name: "autoscaler".to_string(),
                values: AddonValues::default(),
            },
            status: None,
        };

        let raw = serde_json::to_value(&addon).unwrap();
        assert_eq!(raw["spec"]["clusterID"], "c-1");
        assert_eq!(raw["spec"]["addonTemplateName"], "autoscaler");
    }

    #[test]
    fn addon_status_deserialises() {
        let raw = serde_json::json!({
            "kind": "Addon",
            "apiVersion": "v3",
            "metadata": { "uid": "a-1" },
            "spec": { "clusterID": "c-1", "version": "1.27.x",
                      "addonTemplateName": "autoscaler", "values": {} },
            "status": { "status": "running" }
        });
        let addon: Addon = serde_json::from_value(raw).unwrap();
        assert_eq!(addon.status.unwrap().status, "running");
    }
}
