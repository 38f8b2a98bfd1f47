//! CCE resource schema definitions
//!
//! One schema per resource type, plus the attribute types shared between
//! nodes and node pools (volumes, taints, runtime).

mod addon;
mod cluster;
mod node;
mod node_pool;

pub use addon::addon_schema;
pub use cluster::cluster_schema;
pub use node::node_schema;
pub use node_pool::node_pool_schema;

use vela_core::resource::Value;
use vela_core::schema::{AttributeType, ResourceSchema};

/// A disk specification: `{ size = 100, volumetype = "SSD", kms_id = "..." }`
pub fn volume() -> AttributeType {
    AttributeType::Custom {
        name: "Volume".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| {
            let Value::Map(map) = value else {
                return Err("Expected a volume object".to_string());
            };
            match map.get("size") {
                Some(Value::Int(_)) => {}
                Some(_) => return Err("size must be an integer".to_string()),
                None => return Err("size is required".to_string()),
            }
            match map.get("volumetype") {
                Some(Value::String(_)) => {}
                Some(_) => return Err("volumetype must be a string".to_string()),
                None => return Err("volumetype is required".to_string()),
            }
            if let Some(kms) = map.get("kms_id") {
                if kms.as_str().is_none() {
                    return Err("kms_id must be a string".to_string());
                }
            }
            Ok(())
        },
    }
}

/// A kubernetes taint: `{ key, value, effect }`
pub fn taint() -> AttributeType {
    AttributeType::Custom {
        name: "Taint".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| {
            let Value::Map(map) = value else {
                return Err("Expected a taint object".to_string());
            };
            if map.get("key").and_then(Value::as_str).is_none() {
                return Err("key is required".to_string());
            }
            match map.get("effect").and_then(Value::as_str) {
                Some("NoSchedule" | "PreferNoSchedule" | "NoExecute") => Ok(()),
                Some(other) => Err(format!(
                    "effect '{}' must be NoSchedule, PreferNoSchedule or NoExecute",
                    other
                )),
                None => Err("effect is required".to_string()),
            }
        },
    }
}

pub fn runtime() -> AttributeType {
    AttributeType::Enum(vec!["docker".to_string(), "containerd".to_string()])
}

/// Returns all CCE schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        cluster_schema(),
        node_schema(),
        node_pool_schema(),
        addon_schema(),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn volume_requires_size_and_volumetype() {
        let t = volume();
        let good = Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(100)),
            ("volumetype".to_string(), Value::String("SSD".to_string())),
        ]));
        assert!(t.validate(&good).is_ok());

        let no_type = Value::Map(HashMap::from([("size".to_string(), Value::Int(100))]));
        assert!(t.validate(&no_type).is_err());

        let string_size = Value::Map(HashMap::from([
            ("size".to_string(), Value::String("100".to_string())),
            ("volumetype".to_string(), Value::String("SSD".to_string())),
        ]));
        assert!(t.validate(&string_size).is_err());
    }

    #[test]
    fn taint_effect_is_constrained() {
        let t = taint();
        let good = Value::Map(HashMap::from([
            ("key".to_string(), Value::String("dedicated".to_string())),
            ("value".to_string(), Value::String("gpu".to_string())),
            ("effect".to_string(), Value::String("NoSchedule".to_string())),
        ]));
        assert!(t.validate(&good).is_ok());

        let bad = Value::Map(HashMap::from([
            ("key".to_string(), Value::String("dedicated".to_string())),
            ("effect".to_string(), Value::String("Schedule".to_string())),
        ]));
        assert!(t.validate(&bad).is_err());
    }

    #[test]
    fn all_schemas_are_registered() {
        let names: Vec<String> = schemas().iter().map(|s| s.resource_type.clone()).collect();
        assert_eq!(
            names,
            vec!["cce_cluster", "cce_node", "cce_node_pool", "cce_addon"]
        );
    }
}
