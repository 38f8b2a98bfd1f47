//! Typed request/response structs for the cloud's REST APIs
//!
//! One module per service surface. These are thin wire types plus the call
//! functions the controllers use; lifecycle logic lives in the controllers.

pub mod addon;
pub mod cluster;
pub mod ecs;
pub mod eip;
pub mod job;
pub mod k8s;
pub mod node;
pub mod node_pool;
pub mod vpc;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Object metadata shared by CCE v3 resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
