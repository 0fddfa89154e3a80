//! Tag values, quality codes, and the tag triple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dynamically typed value of a PLC data point.
///
/// Connectors publish values as JSON, so the value space is JSON's:
/// booleans, numbers, strings, and occasionally structured payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagValue(serde_json::Value);

impl TagValue {
    /// View the value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    /// View the value as a float.
    ///
    /// Integer values are widened, so this works for any numeric tag.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }

    /// View the value as a signed integer, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }

    /// View the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub fn json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume the value, returning the underlying JSON.
    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Strings print bare, everything else as JSON
        match &self.0 {
            serde_json::Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<serde_json::Value> for TagValue {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self(serde_json::Value::Bool(value))
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self(serde_json::Value::from(value))
    }
}

/// Databus quality code (the `qc` field of a data point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Quality {
    /// Value could not be read from the device
    Bad,
    /// Value is stale or of doubtful accuracy
    Uncertain,
    /// Value was substituted (e.g., a configured fallback)
    SubstituteValue,
    /// Value was read successfully
    Good,
    /// Quality code not defined by the databus
    Other(u8),
}

impl Quality {
    /// Whether the value carrying this quality can be trusted.
    #[must_use]
    pub fn is_good(self) -> bool {
        self == Self::Good
    }
}

impl From<u8> for Quality {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Bad,
            1 => Self::Uncertain,
            2 => Self::SubstituteValue,
            3 => Self::Good,
            other => Self::Other(other),
        }
    }
}

impl From<Quality> for u8 {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Bad => 0,
            Quality::Uncertain => 1,
            Quality::SubstituteValue => 2,
            Quality::Good => 3,
            Quality::Other(code) => code,
        }
    }
}

/// A named data point's current state.
///
/// Updated on receipt of matching inbound data frames; read-only to callers
/// except through the client's explicit write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Current value
    pub val: TagValue,
    /// Time of the last update
    pub ts: DateTime<Utc>,
    /// Quality code of the last update
    pub qc: Quality,
}

impl Tag {
    /// Create a new tag state.
    #[must_use]
    pub fn new(val: TagValue, ts: DateTime<Utc>, qc: Quality) -> Self {
        Self { val, ts, qc }
    }

    /// Whether the current value carries good quality.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.qc.is_good()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_code_roundtrip() {
        for code in 0..=u8::MAX {
            let quality = Quality::from(code);
            assert_eq!(u8::from(quality), code);
        }
    }

    #[test]
    fn quality_good() {
        assert!(Quality::from(3).is_good());
        assert!(!Quality::from(0).is_good());
        assert!(!Quality::from(7).is_good());
    }

    #[test]
    fn tag_value_numeric_views() {
        let v = TagValue::from(42.5);
        assert_eq!(v.as_f64(), Some(42.5));
        assert_eq!(v.as_i64(), None);

        let v = TagValue::from(7_i64);
        assert_eq!(v.as_i64(), Some(7));
        assert_eq!(v.as_f64(), Some(7.0));
    }

    #[test]
    fn tag_value_display() {
        assert_eq!(TagValue::from("Running").to_string(), "Running");
        assert_eq!(TagValue::from(true).to_string(), "true");
        assert_eq!(TagValue::from(22.5).to_string(), "22.5");
    }

    #[test]
    fn tag_serde_wire_shape() {
        let tag = Tag::new(
            TagValue::from(22.5),
            "2024-01-01T00:00:00Z".parse().unwrap(),
            Quality::Good,
        );

        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["val"], serde_json::json!(22.5));
        assert_eq!(json["qc"], serde_json::json!(3));
    }
}
