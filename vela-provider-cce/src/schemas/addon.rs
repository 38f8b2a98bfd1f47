//! Add-on resource schema
//!
//! Every attribute forces recreation: the add-on API offers no in-place
//! mutation, so a change is a delete-and-recreate.

use vela_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Returns the schema for a CCE cluster add-on
pub fn addon_schema() -> ResourceSchema {
    ResourceSchema::new("cce_addon")
        .with_description("A cluster add-on instance (autoscaler, DNS, ...)")
        .attribute(
            AttributeSchema::new("cluster_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("template_name", AttributeType::String)
                .required()
                .force_new()
                .with_description("Add-on template, e.g. autoscaler"),
        )
        .attribute(
            AttributeSchema::new("template_version", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("values_basic", types::string_map())
                .required()
                .force_new()
                .with_description("basic value block; values re-typed before sending"),
        )
        .attribute(
            AttributeSchema::new("values_custom", types::string_map())
                .required()
                .force_new()
                .with_description("custom value block; values re-typed before sending"),
        )
        .attribute(
            AttributeSchema::new("flavor", AttributeType::String)
                .force_new()
                .with_description("Optional flavor block as a JSON document"),
        )
        // ===== Read-only =====
        .attribute(AttributeSchema::new("status", AttributeType::String))
        .attribute(AttributeSchema::new("description", AttributeType::String))
}
