//! Field-level fallbacks for deserializing persisted documents.
//!
//! A single malformed field (a string where a number belongs, an unknown enum
//! variant, `null`) must not sink the whole document. Fields annotated with
//! `deserialize_with = "lenient::or_default"` fall back to their type's
//! default instead of failing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Deserialize `T`, substituting `T::default()` when the value doesn't fit
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Overlay `input` onto `base` one key at a time, keeping only the keys whose
/// values still deserialize into `T`.
///
/// Keys unknown to `T` and `null` values are skipped, so the result carries
/// `base`'s value for every field the input omits or garbles.
pub fn overlay<T>(base: &T, input: &Map<String, Value>) -> T
where
    T: Serialize + DeserializeOwned + Clone,
{
    let Ok(Value::Object(mut merged)) = serde_json::to_value(base) else {
        return base.clone();
    };

    for (key, value) in input {
        if value.is_null() || !merged.contains_key(key) {
            continue;
        }
        let previous = merged.insert(key.clone(), value.clone());
        if serde_json::from_value::<T>(Value::Object(merged.clone())).is_err() {
            if let Some(previous) = previous {
                merged.insert(key.clone(), previous);
            }
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|_| base.clone())
}

/// Read an integer that may have been stored as a float or numeric string
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a count; negatives clamp to zero and the full `u64` range is kept
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) if n.is_u64() => n.as_u64(),
        _ => as_i64(value).map(|v| v.max(0) as u64),
    }
}
