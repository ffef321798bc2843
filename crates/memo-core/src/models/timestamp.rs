//! `updatedAt` wire format.
//!
//! Timestamps are held as Unix milliseconds and written as RFC 3339 strings
//! with millisecond precision (`2024-05-01T10:00:00.000Z`). Reads accept the
//! string form or a bare millisecond number.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Render Unix milliseconds as an RFC 3339 UTC string.
#[must_use]
pub fn to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Interpret a JSON value as a timestamp, `None` when it is not one.
#[must_use]
pub fn from_value(value: &Value) -> Option<i64> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|parsed| parsed.timestamp_millis()),
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        _ => None,
    }
}

pub fn serialize<S>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_rfc3339(*ms))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    from_value(&value).ok_or_else(|| serde::de::Error::custom("invalid timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_millisecond_precision() {
        assert_eq!(to_rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(to_rfc3339(1_500), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn accepts_strings_and_numbers() {
        assert_eq!(
            from_value(&Value::String("1970-01-01T00:00:01.500Z".into())),
            Some(1_500)
        );
        assert_eq!(from_value(&serde_json::json!(200)), Some(200));
        assert_eq!(from_value(&Value::String("yesterday".into())), None);
        assert_eq!(from_value(&Value::Bool(true)), None);
    }
}
