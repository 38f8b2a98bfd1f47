//! ECS server tags
//!
//! The node controller reconciles user tags against the server backing a
//! node; the cloud manages two reserved keys on every CCE-provisioned
//! server which are stripped on read.

use serde::{Deserialize, Serialize};

use crate::client::{ApiResult, ServiceClient};

/// Tag keys the cloud manages on CCE-provisioned servers
pub const RESERVED_TAG_KEYS: [&str; 2] = ["CCE-Dynamic-Provisioning-Node", "CCE-Cluster-ID"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerTags {
    #[serde(default)]
    pub tags: Vec<ServerTag>,
}

#[derive(Debug, Clone, Serialize)]
struct TagAction<'a> {
    action: &'a str,
    tags: &'a [ServerTag],
}

pub async fn tags(client: &ServiceClient, server_id: &str) -> ApiResult<ServerTags> {
    client
        .get(&format!("cloudservers/{}/tags", server_id))
        .await
}

pub async fn add_tags(
    client: &ServiceClient,
    server_id: &str,
    tags: &[ServerTag],
) -> ApiResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let body = TagAction {
        action: "create",
        tags,
    };
    let _: serde_json::Value = client
        .post(&format!("cloudservers/{}/tags/action", server_id), &body)
        .await?;
    Ok(())
}

pub async fn remove_tags(
    client: &ServiceClient,
    server_id: &str,
    tags: &[ServerTag],
) -> ApiResult<()> {
    if tags.is_empty() {
        return Ok(());
    }
    let body = TagAction {
        action: "delete",
        tags,
    };
    let _: serde_json::Value = client
        .post(&format!("cloudservers/{}/tags/action", server_id), &body)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_tags_deserialise() {
        let raw = serde_json::json!({
            "tags": [
                { "key": "team", "value": "a" },
                { "key": "CCE-Cluster-ID", "value": "c-1" }
            ]
        });
        let tags: ServerTags = serde_json::from_value(raw).unwrap();
        assert_eq!(tags.tags.len(), 2);
        assert_eq!(tags.tags[0].key, "team");
    }
}
