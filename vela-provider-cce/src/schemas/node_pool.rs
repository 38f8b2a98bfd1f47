//! Node pool resource schema

use vela_core::resource::Value;
use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{runtime, taint, volume};

/// Returns the schema for a CCE node pool
pub fn node_pool_schema() -> ResourceSchema {
    ResourceSchema::new("cce_node_pool")
        .with_description("An auto-scalable template for worker nodes")
        .attribute(
            AttributeSchema::new("cluster_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("flavor", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .force_new()
                .with_default(Value::String("random".to_string())),
        )
        .attribute(AttributeSchema::new("os", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("key_pair", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("password", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("root_volume", volume())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("data_volumes", AttributeType::List(Box::new(volume())))
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("initial_node_count", types::non_negative_int()).required(),
        )
        // ===== Autoscaling (updatable) =====
        .attribute(AttributeSchema::new("scale_enable", AttributeType::Bool))
        .attribute(AttributeSchema::new("min_node_count", types::non_negative_int()))
        .attribute(AttributeSchema::new("max_node_count", types::non_negative_int()))
        .attribute(AttributeSchema::new(
            "scale_down_cooldown_time",
            types::non_negative_int(),
        ))
        .attribute(AttributeSchema::new("priority", types::non_negative_int()))
        // ===== Node template metadata =====
        .attribute(AttributeSchema::new("k8s_tags", types::string_map()))
        .attribute(AttributeSchema::new(
            "taints",
            AttributeType::List(Box::new(taint())),
        ))
        .attribute(AttributeSchema::new("user_tags", types::string_map()).force_new())
        .attribute(AttributeSchema::new("runtime", runtime()).force_new())
        .attribute(AttributeSchema::new("subnet_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("preinstall", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("postinstall", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("server_group_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("agency_name", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("docker_base_size", types::positive_int()).force_new())
        .attribute(
            AttributeSchema::new("docker_lvm_config_override", AttributeType::String).force_new(),
        )
        // ===== Read-only =====
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new(
            "current_node_count",
            AttributeType::Int,
        ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn volume_value(size: i64) -> Value {
        Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(size)),
            ("volumetype".to_string(), Value::String("SAS".to_string())),
        ]))
    }

    #[test]
    fn minimal_pool_validates() {
        let schema = node_pool_schema();
        let attrs = HashMap::from([
            (
                "cluster_id".to_string(),
                Value::String("cluster-1".to_string()),
            ),
            ("name".to_string(), Value::String("pool-a".to_string())),
            (
                "flavor".to_string(),
                Value::String("s3.large.2".to_string()),
            ),
            ("key_pair".to_string(), Value::String("ssh-k1".to_string())),
            ("root_volume".to_string(), volume_value(40)),
            (
                "data_volumes".to_string(),
                Value::List(vec![volume_value(100)]),
            ),
            ("initial_node_count".to_string(), Value::Int(1)),
            ("scale_enable".to_string(), Value::Bool(true)),
            ("min_node_count".to_string(), Value::Int(1)),
            ("max_node_count".to_string(), Value::Int(3)),
        ]);
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn scaling_fields_stay_updatable() {
        let force_new = node_pool_schema().force_new_attributes().join(",");
        for updatable in ["initial_node_count", "min_node_count", "max_node_count", "k8s_tags"] {
            assert!(!force_new.contains(updatable), "{} must be updatable", updatable);
        }
        for pinned in [
            "flavor",
            "os",
            "subnet_id",
            "docker_base_size",
            "agency_name",
            "docker_lvm_config_override",
        ] {
            assert!(force_new.contains(pinned), "{} must force recreation", pinned);
        }
    }
}
