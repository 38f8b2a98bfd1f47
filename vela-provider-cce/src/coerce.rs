//! Value coercion for string-typed maps
//!
//! The host schema forces map values to strings, but the add-on API is
//! typed. Each string is re-typed by trying, in order: integer, boolean,
//! 64-bit float, JSON object, and falling back to the original string.

use std::collections::HashMap;

use serde_json::Value;

/// Re-type one string value.
pub fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(b) = raw.parse::<bool>() {
        return Value::from(b);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    if raw.trim_start().starts_with('{') {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) {
            return Value::Object(object);
        }
    }
    Value::from(raw)
}

/// Re-type every value of a flat string map, preserving keys.
pub fn coerce_map(values: &HashMap<String, String>) -> serde_json::Map<String, Value> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), coerce(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_win_over_floats() {
        assert_eq!(coerce("42"), Value::from(42i64));
        assert_eq!(coerce("-7"), Value::from(-7i64));
        assert_eq!(coerce("0"), Value::from(0i64));
    }

    #[test]
    fn booleans() {
        assert_eq!(coerce("true"), Value::from(true));
        assert_eq!(coerce("false"), Value::from(false));
        // Only the lowercase literals parse as bool.
        assert_eq!(coerce("True"), Value::from("True"));
    }

    #[test]
    fn floats() {
        assert_eq!(coerce("1.5"), Value::from(1.5f64));
        assert_eq!(coerce("-0.25"), Value::from(-0.25f64));
    }

    #[test]
    fn json_objects() {
        let coerced = coerce(r#"{"cpu": "250m", "limit": 2}"#);
        assert_eq!(coerced["cpu"], Value::from("250m"));
        assert_eq!(coerced["limit"], Value::from(2i64));
    }

    #[test]
    fn malformed_json_stays_a_string() {
        assert_eq!(coerce("{not json"), Value::from("{not json"));
    }

    #[test]
    fn plain_strings_pass_through() {
        assert_eq!(coerce("cce.s1.small"), Value::from("cce.s1.small"));
        assert_eq!(coerce(""), Value::from(""));
        // "inf" parses as f64 but is not a representable JSON number.
        assert_eq!(coerce("inf"), Value::from("inf"));
    }

    #[test]
    fn coerce_map_preserves_keys() {
        let input = HashMap::from([
            ("replicas".to_string(), "2".to_string()),
            ("enabled".to_string(), "true".to_string()),
            ("image".to_string(), "autoscaler:v1".to_string()),
        ]);
        let out = coerce_map(&input);
        assert_eq!(out["replicas"], Value::from(2i64));
        assert_eq!(out["enabled"], Value::from(true));
        assert_eq!(out["image"], Value::from("autoscaler:v1"));
    }
}
