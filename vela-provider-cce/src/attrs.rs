//! Attribute translation helpers
//!
//! Conversions between the host's attribute values and the wire types,
//! shared by the node and node-pool controllers.

use std::collections::HashMap;

use vela_core::provider::ProviderError;
use vela_core::resource::{Resource, State, Value};

use crate::api::node::{Taint, UserTag, Volume};

/// Read a map-of-strings attribute; non-string values were already rejected
/// by the schema layer and are skipped here.
pub(crate) fn string_map(value: Option<&Value>) -> HashMap<String, String> {
    let Some(Value::Map(map)) = value else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::List(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect()
}

pub(crate) fn volume_from_value(value: &Value, path: &str) -> Result<Volume, ProviderError> {
    let Value::Map(map) = value else {
        return Err(ProviderError::new(format!("{} must be a volume object", path)));
    };
    let size = map
        .get("size")
        .and_then(Value::as_int)
        .ok_or_else(|| ProviderError::new(format!("{}.size is required", path)))?;
    let volume_type = map
        .get("volumetype")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::new(format!("{}.volumetype is required", path)))?;

    let volume = Volume {
        size,
        volume_type: volume_type.to_string(),
        metadata: None,
    };
    Ok(match map.get("kms_id").and_then(Value::as_str) {
        Some(kms_id) if !kms_id.is_empty() => volume.with_kms_id(kms_id),
        _ => volume,
    })
}

pub(crate) fn volumes_from_attr(
    attributes: &HashMap<String, Value>,
    key: &str,
) -> Result<Vec<Volume>, ProviderError> {
    let Some(Value::List(items)) = attributes.get(key) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .enumerate()
        .map(|(i, v)| volume_from_value(v, &format!("{}[{}]", key, i)))
        .collect()
}

pub(crate) fn taints_from_attr(attributes: &HashMap<String, Value>) -> Vec<Taint> {
    let Some(Value::List(items)) = attributes.get("taints") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_map)
        .map(|map| Taint {
            key: map
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            value: map
                .get("value")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
            effect: map
                .get("effect")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

pub(crate) fn user_tags_from_attr(attributes: &HashMap<String, Value>, key: &str) -> Vec<UserTag> {
    let mut tags: Vec<UserTag> = string_map(attributes.get(key))
        .into_iter()
        .map(|(key, value)| UserTag { key, value })
        .collect();
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    tags
}

/// Carry declared attributes the cloud never echoes back (passwords,
/// creation-only flags) into the state produced by a post-mutation read.
pub(crate) fn merge_declared(state: &mut State, resource: &Resource) {
    for (key, value) in &resource.attributes {
        state
            .attributes
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Turn a volume back into the map shape the host schema expects
pub(crate) fn volume_to_value(volume: &Volume) -> Result<Value, ProviderError> {
    let mut map = HashMap::from([
        ("size".to_string(), Value::Int(volume.size)),
        (
            "volumetype".to_string(),
            Value::String(volume.volume_type.clone()),
        ),
    ]);
    if let Some(kms_id) = volume
        .kms_id()
        .map_err(|msg| ProviderError::new(format!("inconsistent volume encryption: {}", msg)))?
    {
        map.insert("kms_id".to_string(), Value::String(kms_id.to_string()));
    }
    Ok(Value::Map(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::node::KMS_ID_KEY;

    #[test]
    fn volume_from_value_requires_fields() {
        let incomplete = Value::Map(HashMap::from([("size".to_string(), Value::Int(40))]));
        let err = volume_from_value(&incomplete, "root_volume").unwrap_err();
        assert!(err.message.contains("root_volume.volumetype"));
    }

    #[test]
    fn volume_roundtrips_through_value() {
        let value = Value::Map(HashMap::from([
            ("size".to_string(), Value::Int(100)),
            ("volumetype".to_string(), Value::String("SSD".to_string())),
            ("kms_id".to_string(), Value::String("kms-1".to_string())),
        ]));
        let volume = volume_from_value(&value, "data_volumes[0]").unwrap();
        assert_eq!(volume.kms_id().unwrap(), Some("kms-1"));

        let back = volume_to_value(&volume).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn inconsistent_kms_metadata_fails_translation() {
        let volume = Volume {
            size: 100,
            volume_type: "SSD".to_string(),
            metadata: Some(HashMap::from([(
                KMS_ID_KEY.to_string(),
                "kms-1".to_string(),
            )])),
        };
        assert!(volume_to_value(&volume).is_err());
    }

    #[test]
    fn user_tags_are_sorted_by_key() {
        let attrs = HashMap::from([(
            "tags".to_string(),
            Value::Map(HashMap::from([
                ("zeta".to_string(), Value::String("1".to_string())),
                ("alpha".to_string(), Value::String("2".to_string())),
            ])),
        )]);
        let tags = user_tags_from_attr(&attrs, "tags");
        assert_eq!(tags[0].key, "alpha");
        assert_eq!(tags[1].key, "zeta");
    }
}
