//! Node resource schema

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{runtime, taint, volume};

/// Returns the schema for a CCE worker node
pub fn node_schema() -> ResourceSchema {
    ResourceSchema::new("cce_node")
        .with_description("One worker VM attached to a cluster")
        .attribute(
            AttributeSchema::new("cluster_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .with_description("Node name; updatable in place"),
        )
        .attribute(
            AttributeSchema::new("flavor", AttributeType::String)
                .required()
                .force_new()
                .with_description("VM flavor, e.g. s3.large.2"),
        )
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("os", AttributeType::String).force_new())
        // ===== Login (exactly one) =====
        .attribute(AttributeSchema::new("key_pair", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("password", AttributeType::String).force_new())
        // ===== Volumes =====
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
        // ===== Networking =====
        .attribute(AttributeSchema::new("subnet_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("fixed_ip", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("eip_ids", types::string_list())
                .with_description("Existing floating IPs to bind; conflicts with the inline fields"),
        )
        .attribute(AttributeSchema::new("eip_count", types::non_negative_int()))
        .attribute(
            AttributeSchema::new("bandwidth_size", types::non_negative_int())
                .with_description("Mbit/s for the allocated floating IP; 0 releases it"),
        )
        .attribute(AttributeSchema::new("iptype", AttributeType::String))
        .attribute(AttributeSchema::new("sharetype", AttributeType::String))
        .attribute(AttributeSchema::new(
            "bandwidth_charge_mode",
            AttributeType::String,
        ))
        // ===== Placement and lifecycle hooks =====
        .attribute(AttributeSchema::new("ecs_group_id", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("agency_name", AttributeType::String)
                .force_new()
                .with_description("IAM agency the node's kubelet acts under"),
        )
        .attribute(
            AttributeSchema::new("max_pods", types::positive_int())
                .force_new()
                .with_description("Pod capacity advertised by the kubelet"),
        )
        .attribute(AttributeSchema::new("docker_base_size", types::positive_int()).force_new())
        .attribute(
            AttributeSchema::new("docker_lvm_config_override", AttributeType::String)
                .force_new()
                .with_description("Thin-pool layout for the container storage volume group"),
        )
        .attribute(
            AttributeSchema::new("preinstall", AttributeType::String)
                .force_new()
                .with_description("Script run before installation; sent base64-encoded"),
        )
        .attribute(
            AttributeSchema::new("postinstall", AttributeType::String)
                .force_new()
                .with_description("Script run after installation; sent base64-encoded"),
        )
        // ===== Metadata =====
        .attribute(AttributeSchema::new("k8s_tags", types::string_map()).force_new())
        .attribute(
            AttributeSchema::new("taints", AttributeType::List(Box::new(taint()))).force_new(),
        )
        .attribute(
            AttributeSchema::new("tags", types::string_map())
                .with_description("ECS server tags; reconciled in place"),
        )
        .attribute(AttributeSchema::new("runtime", runtime()).force_new())
        .attribute(AttributeSchema::new("extend_params", types::string_map()).force_new())
        // ===== Read-only =====
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new("server_id", AttributeType::String))
        .attribute(AttributeSchema::new("private_ip", AttributeType::String))
        .attribute(AttributeSchema::new("public_ip", AttributeType::String))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use vela_core::resource::Value;

    use super::*;

    fn volume_value(size: i64) -> Value {
        Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(size)),
            ("volumetype".to_string(), Value::String("SSD".to_string())),
        ]))
    }

    fn minimal() -> HashMap<String, Value> {
        HashMap::from([
            (
                "cluster_id".to_string(),
                Value::String("cluster-1".to_string()),
            ),
            (
                "flavor".to_string(),
                Value::String("s3.large.2".to_string()),
            ),
            (
                "availability_zone".to_string(),
                Value::String("eu-de-01".to_string()),
            ),
            ("key_pair".to_string(), Value::String("ssh-k1".to_string())),
            ("root_volume".to_string(), volume_value(40)),
            (
                "data_volumes".to_string(),
                Value::List(vec![volume_value(100)]),
            ),
        ])
    }

    #[test]
    fn minimal_node_validates() {
        assert!(node_schema().validate(&minimal()).is_ok());
    }

    #[test]
    fn runtime_enum_is_constrained() {
        let mut attrs = minimal();
        attrs.insert(
            "runtime".to_string(),
            Value::String("containerd".to_string()),
        );
        assert!(node_schema().validate(&attrs).is_ok());

        attrs.insert("runtime".to_string(), Value::String("cri-o".to_string()));
        assert!(node_schema().validate(&attrs).is_err());
    }

    #[test]
    fn name_and_tags_do_not_force_recreation() {
        let schema = node_schema();
        let force_new = schema.force_new_attributes();
        for updatable in ["name", "tags", "bandwidth_size", "eip_ids"] {
            assert!(
                !force_new.iter().any(|a| *a == updatable),
                "{} must be updatable",
                updatable
            );
        }
        for pinned in [
            "flavor",
            "root_volume",
            "max_pods",
            "agency_name",
            "docker_base_size",
            "docker_lvm_config_override",
        ] {
            assert!(
                force_new.iter().any(|a| *a == pinned),
                "{} must force recreation",
                pinned
            );
        }
    }
}
