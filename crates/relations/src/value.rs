//! Attribute value helpers
//!
//! Attribute values are plain `serde_json::Value`s. Key matching between
//! owners and related rows goes through [`key_of`], so an integer column and
//! a string column holding the same digits still pair up.

use std::cmp::Ordering;

use serde_json::Value;

/// Normalized key for a scalar value. `None` for null and compound values,
/// which never participate in key matching.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        (f as i64).to_string()
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Key equality; null never equals anything
pub fn keys_equal(a: &Value, b: &Value) -> bool {
    match (key_of(a), key_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Human-readable rendering used in error messages
pub fn display_key(value: &Value) -> String {
    key_of(value).unwrap_or_else(|| value.to_string())
}

/// Total ordering for sorting and min/max. Nulls sort first, numbers compare
/// numerically, mismatched types compare equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or_default()
                .partial_cmp(&b.as_f64().unwrap_or_default())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Numeric view of a value, accepting numeric strings
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Distinct non-null keys in first-seen order
pub fn distinct_keys<'a, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();
    for value in values {
        if let Some(key) = key_of(value) {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_of_normalizes_numbers_and_strings() {
        assert_eq!(key_of(&json!(1)), Some("1".to_string()));
        assert_eq!(key_of(&json!("1")), Some("1".to_string()));
        assert_eq!(key_of(&json!(1.0)), Some("1".to_string()));
        assert_eq!(key_of(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(key_of(&Value::Null), None);
        assert_eq!(key_of(&json!([1])), None);
    }

    #[test]
    fn test_keys_equal_ignores_nulls() {
        assert!(keys_equal(&json!(3), &json!("3")));
        assert!(!keys_equal(&Value::Null, &Value::Null));
        assert!(!keys_equal(&json!(3), &json!(4)));
    }

    #[test]
    fn test_distinct_keys_preserves_first_seen_order() {
        let values = vec![json!(3), json!(1), json!("3"), Value::Null, json!(2), json!(1)];
        assert_eq!(distinct_keys(&values), vec![json!(3), json!(1), json!(2)]);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
    }
}
