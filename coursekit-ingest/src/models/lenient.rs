//! Lenient deserializers for hand-written manifests
//!
//! Authors write manifests by hand, so scalar fields arrive in more than one
//! shape. These helpers coerce every accepted shape into one Rust type at the
//! parser boundary; nothing downstream looks at raw JSON.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Accepts a JSON array of strings/numbers, a comma-separated string, or null
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let items = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| scalar_to_string(&v))
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a list or comma-separated string, got {}",
                other
            )))
        }
    };
    Ok(items)
}

/// Accepts an integer, an integral float, a numeric string, or null
pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                Ok(Some(f as i64))
            } else {
                Err(serde::de::Error::custom(format!("expected an integer, got {}", n)))
            }
        }
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got \"{}\"", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

/// Accepts a string or a number (ids are sometimes written unquoted)
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(scalar_to_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Accepts a list whose items are either a bare string shorthand or a full object
pub fn declarations<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + From<String>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => Ok(T::from(s)),
            other => serde_json::from_value(other).map_err(<D::Error as serde::de::Error>::custom),
        })
        .collect()
}

/// Accepts a bare string shorthand or a full object for a single optional field
pub fn opt_declaration<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + From<String>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(T::from(s))),
        Some(other) => serde_json::from_value(other)
            .map(Some)
            .map_err(<D::Error as serde::de::Error>::custom),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
