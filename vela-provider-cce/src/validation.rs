//! Cross-field validation of CCE resource attributes
//!
//! Schema types catch per-field mistakes; this module holds the checks that
//! span fields: exactly one login method, EIP field exclusivity, volume
//! size bounds, and the cluster naming rule.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use vela_core::resource::Value;

/// Validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult = Result<(), Vec<ValidationError>>;

static CLUSTER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // lowercase alphanumeric and hyphens, starting with a letter, 4-128 chars
    Regex::new(r"^[a-z][a-z0-9-]{2,126}[a-z0-9]$").unwrap()
});

/// Validate cluster attributes before any call leaves the process
pub fn validate_cluster(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    if let Some(Value::String(name)) = attributes.get("name") {
        if !CLUSTER_NAME.is_match(name) {
            errors.push(ValidationError {
                path: "name".to_string(),
                message: format!(
                    "cluster name '{}' must be 4-128 lowercase letters, digits or hyphens and start with a letter",
                    name
                ),
            });
        }
    }

    finish(errors)
}

/// Validate node attributes (shared with the node template of a pool)
pub fn validate_node(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    check_login(attributes, &mut errors);
    check_eip_exclusivity(attributes, &mut errors);
    check_volumes(attributes, &mut errors);

    finish(errors)
}

pub fn validate_node_pool(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    check_login(attributes, &mut errors);
    check_volumes(attributes, &mut errors);

    if let Some(Value::Bool(true)) = attributes.get("scale_enable") {
        let min = attributes.get("min_node_count").and_then(Value::as_int);
        let max = attributes.get("max_node_count").and_then(Value::as_int);
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.push(ValidationError {
                    path: "min_node_count".to_string(),
                    message: format!(
                        "min_node_count ({}) cannot exceed max_node_count ({})",
                        min, max
                    ),
                });
            }
        }
    }

    finish(errors)
}

pub fn validate_addon(attributes: &HashMap<String, Value>) -> ValidationResult {
    let mut errors = Vec::new();

    if let Some(Value::String(flavor)) = attributes.get("flavor") {
        if !flavor.is_empty() && serde_json::from_str::<serde_json::Value>(flavor).is_err() {
            errors.push(ValidationError {
                path: "flavor".to_string(),
                message: "flavor must be a JSON document".to_string(),
            });
        }
    }

    finish(errors)
}

/// Exactly one of `key_pair` and `password` must be set
fn check_login(attributes: &HashMap<String, Value>, errors: &mut Vec<ValidationError>) {
    let key_pair = non_empty_string(attributes.get("key_pair"));
    let password = non_empty_string(attributes.get("password"));

    match (key_pair, password) {
        (false, false) => errors.push(ValidationError {
            path: "key_pair".to_string(),
            message: "one of key_pair or password is required".to_string(),
        }),
        (true, true) => errors.push(ValidationError {
            path: "key_pair".to_string(),
            message: "key_pair and password are mutually exclusive".to_string(),
        }),
        _ => {}
    }
}

/// `eip_ids` and the inline allocation fields produce different wire
/// requests; mixing them is rejected outright.
fn check_eip_exclusivity(attributes: &HashMap<String, Value>, errors: &mut Vec<ValidationError>) {
    let has_ids = matches!(attributes.get("eip_ids"), Some(Value::List(ids)) if !ids.is_empty());
    let inline = ["eip_count", "bandwidth_size", "iptype", "sharetype", "bandwidth_charge_mode"]
        .iter()
        .find(|field| is_set(attributes.get(**field)));

    if has_ids {
        if let Some(field) = inline {
            errors.push(ValidationError {
                path: "eip_ids".to_string(),
                message: format!("eip_ids conflicts with {}", field),
            });
        }
    }

    let eip_count = attributes.get("eip_count").and_then(Value::as_int);
    let bandwidth = attributes.get("bandwidth_size").and_then(Value::as_int);
    if eip_count.is_some_and(|n| n > 0) && !bandwidth.is_some_and(|b| b > 0) {
        errors.push(ValidationError {
            path: "bandwidth_size".to_string(),
            message: "bandwidth_size is required when eip_count is set".to_string(),
        });
    }
}

fn check_volumes(attributes: &HashMap<String, Value>, errors: &mut Vec<ValidationError>) {
    if let Some(Value::Map(root)) = attributes.get("root_volume") {
        if let Some(size) = root.get("size").and_then(Value::as_int) {
            if !(10..=32768).contains(&size) {
                errors.push(ValidationError {
                    path: "root_volume.size".to_string(),
                    message: format!("root volume size {} outside 10..=32768 GB", size),
                });
            }
        }
    }

    match attributes.get("data_volumes") {
        Some(Value::List(volumes)) => {
            if volumes.is_empty() {
                errors.push(ValidationError {
                    path: "data_volumes".to_string(),
                    message: "at least one data volume is required".to_string(),
                });
            }
            for (i, volume) in volumes.iter().enumerate() {
                if let Value::Map(map) = volume {
                    if let Some(size) = map.get("size").and_then(Value::as_int) {
                        if !(100..=32768).contains(&size) {
                            errors.push(ValidationError {
                                path: format!("data_volumes[{}].size", i),
                                message: format!("data volume size {} outside 100..=32768 GB", size),
                            });
                        }
                    }
                }
            }
        }
        Some(_) => errors.push(ValidationError {
            path: "data_volumes".to_string(),
            message: "data_volumes must be a list".to_string(),
        }),
        None => {}
    }
}

fn non_empty_string(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if !s.is_empty())
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Int(n)) => *n != 0,
        Some(_) => true,
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a resource based on its type
pub fn validate_resource(
    resource_type: &str,
    attributes: &HashMap<String, Value>,
) -> ValidationResult {
    match resource_type {
        "cce_cluster" => validate_cluster(attributes),
        "cce_node" => validate_node(attributes),
        "cce_node_pool" => validate_node_pool(attributes),
        "cce_addon" => validate_addon(attributes),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_attr(value: &str) -> Value {
        Value::String(value.to_string())
    }

    fn volume(size: i64) -> Value {
        Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(size)),
            ("volumetype".to_string(), str_attr("SSD")),
        ]))
    }

    #[test]
    fn accepts_well_formed_cluster_name() {
        let attrs = HashMap::from([("name".to_string(), str_attr("tf-acc-cce-01"))]);
        assert!(validate_cluster(&attrs).is_ok());
    }

    #[test]
    fn rejects_bad_cluster_names() {
        for name in ["Ab-cluster", "1cluster", "ab", "trailing-"] {
            let attrs = HashMap::from([("name".to_string(), str_attr(name))]);
            let errors = validate_cluster(&attrs).unwrap_err();
            assert_eq!(errors[0].path, "name", "name {:?}", name);
        }
    }

    #[test]
    fn node_requires_exactly_one_login() {
        let base = HashMap::from([("data_volumes".to_string(), Value::List(vec![volume(100)]))]);

        let errors = validate_node(&base).unwrap_err();
        assert!(errors[0].message.contains("required"));

        let mut both = base.clone();
        both.insert("key_pair".to_string(), str_attr("kp"));
        both.insert("password".to_string(), str_attr("hunter2"));
        let errors = validate_node(&both).unwrap_err();
        assert!(errors[0].message.contains("mutually exclusive"));

        let mut one = base;
        one.insert("key_pair".to_string(), str_attr("kp"));
        assert!(validate_node(&one).is_ok());
    }

    #[test]
    fn eip_ids_conflict_with_inline_fields() {
        let attrs = HashMap::from([
            ("key_pair".to_string(), str_attr("kp")),
            ("data_volumes".to_string(), Value::List(vec![volume(100)])),
            ("eip_ids".to_string(), Value::List(vec![str_attr("eip-1")])),
            ("bandwidth_size".to_string(), Value::Int(5)),
        ]);

        let errors = validate_node(&attrs).unwrap_err();
        assert!(errors[0].message.contains("conflicts with bandwidth_size"));
    }

    #[test]
    fn eip_count_without_bandwidth_is_rejected() {
        let attrs = HashMap::from([
            ("key_pair".to_string(), str_attr("kp")),
            ("data_volumes".to_string(), Value::List(vec![volume(100)])),
            ("eip_count".to_string(), Value::Int(1)),
        ]);

        let errors = validate_node(&attrs).unwrap_err();
        assert!(errors[0].message.contains("bandwidth_size is required"));
    }

    #[test]
    fn volume_bounds() {
        let attrs = HashMap::from([
            ("key_pair".to_string(), str_attr("kp")),
            ("root_volume".to_string(), volume(9)),
            (
                "data_volumes".to_string(),
                Value::List(vec![volume(100), volume(40)]),
            ),
        ]);

        let errors = validate_node(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "root_volume.size");
        assert_eq!(errors[1].path, "data_volumes[1].size");
    }

    #[test]
    fn empty_data_volume_list_is_rejected() {
        let attrs = HashMap::from([
            ("key_pair".to_string(), str_attr("kp")),
            ("data_volumes".to_string(), Value::List(vec![])),
        ]);

        let errors = validate_node(&attrs).unwrap_err();
        assert!(errors[0].message.contains("at least one"));
    }

    #[test]
    fn pool_autoscaling_bounds() {
        let attrs = HashMap::from([
            ("key_pair".to_string(), str_attr("kp")),
            ("data_volumes".to_string(), Value::List(vec![volume(100)])),
            ("scale_enable".to_string(), Value::Bool(true)),
            ("min_node_count".to_string(), Value::Int(5)),
            ("max_node_count".to_string(), Value::Int(3)),
        ]);

        let errors = validate_node_pool(&attrs).unwrap_err();
        assert!(errors[0].message.contains("cannot exceed"));
    }

    #[test]
    fn addon_flavor_must_be_json() {
        let attrs = HashMap::from([("flavor".to_string(), str_attr("{broken"))]);
        assert!(validate_addon(&attrs).is_err());

        let attrs = HashMap::from([("flavor".to_string(), str_attr(r#"{"replicas": 2}"#))]);
        assert!(validate_addon(&attrs).is_ok());
    }

    #[test]
    fn unknown_types_pass() {
        assert!(validate_resource("cce_quota", &HashMap::new()).is_ok());
    }
}
