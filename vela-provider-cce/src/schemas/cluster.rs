//! Cluster resource schema

use vela_core::resource::Value;
use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for a CCE cluster
pub fn cluster_schema() -> ResourceSchema {
    ResourceSchema::new("cce_cluster")
        .with_description("A managed Kubernetes control plane")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new()
                .with_description("Cluster name (lowercase letters, digits, hyphens)"),
        )
        .attribute(
            AttributeSchema::new("flavor", AttributeType::String)
                .required()
                .force_new()
                .with_description("Control-plane flavor, e.g. cce.s1.small"),
        )
        .attribute(
            AttributeSchema::new("cluster_version", AttributeType::String)
                .force_new()
                .with_description("Kubernetes version; latest when omitted"),
        )
        .attribute(
            AttributeSchema::new(
                "cluster_type",
                AttributeType::Enum(vec![
                    "VirtualMachine".to_string(),
                    "ARM64".to_string(),
                    "BareMetal".to_string(),
                ]),
            )
            .force_new()
            .with_default(Value::String("VirtualMachine".to_string())),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("vpc_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("subnet_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("highway_subnet_id", AttributeType::String)
                .force_new()
                .with_description("High-throughput network subnet (bare-metal only)"),
        )
        .attribute(
            AttributeSchema::new(
                "container_network_type",
                AttributeType::Enum(vec![
                    "overlay_l2".to_string(),
                    "underlay_ipvlan".to_string(),
                    "vpc-router".to_string(),
                    "eni".to_string(),
                ]),
            )
            .required()
            .force_new(),
        )
        .attribute(
            AttributeSchema::new("container_network_cidr", AttributeType::String).force_new(),
        )
        .attribute(
            AttributeSchema::new("service_network_cidr", AttributeType::String)
                .force_new()
                .with_description("CIDR for kubernetes service addresses"),
        )
        .attribute(
            AttributeSchema::new(
                "authentication_mode",
                AttributeType::Enum(vec![
                    "rbac".to_string(),
                    "x509".to_string(),
                    "authenticating_proxy".to_string(),
                ]),
            )
            .force_new()
            .with_default(Value::String("rbac".to_string())),
        )
        .attribute(
            AttributeSchema::new("authenticating_proxy_ca", AttributeType::String)
                .force_new()
                .with_description("PEM CA for authenticating_proxy mode; sent base64-encoded"),
        )
        .attribute(AttributeSchema::new("multi_az", AttributeType::Bool).force_new())
        .attribute(
            AttributeSchema::new("eip", AttributeType::String)
                .with_description("Floating IP to bind to the kubernetes API endpoint"),
        )
        .attribute(
            AttributeSchema::new("billing_mode", types::non_negative_int()).force_new(),
        )
        .attribute(AttributeSchema::new("labels", types::string_map()).force_new())
        .attribute(AttributeSchema::new("annotations", types::string_map()).force_new())
        .attribute(AttributeSchema::new("extend_params", types::string_map()).force_new())
        .attribute(
            AttributeSchema::new("no_addons", AttributeType::Bool)
                .force_new()
                .with_description("Remove the default add-ons the cloud installs on creation"),
        )
        // ===== Read-only =====
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new("internal_endpoint", AttributeType::String))
        .attribute(AttributeSchema::new("external_endpoint", AttributeType::String))
        .attribute(AttributeSchema::new("installed_addons", types::string_list()))
        .attribute(AttributeSchema::new(
            "certificate_clusters",
            AttributeType::List(Box::new(types::string_map())),
        ))
        .attribute(AttributeSchema::new(
            "certificate_users",
            AttributeType::List(Box::new(types::string_map())),
        ))
}
