//! JSON frames exchanged on the databus topics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A bulk data frame published by the connector on a read topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFrame {
    /// Connector-assigned sequence number
    #[serde(default)]
    pub seq: u64,
    /// Data points carried by this frame
    pub vals: Vec<DataPoint>,
}

impl DataFrame {
    /// Decode a data frame from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a valid data frame.
    pub fn from_json(payload: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(payload).map_err(|e| FrameError::Decode(e.to_string()))
    }

    /// Encode the frame to a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, FrameError> {
        serde_json::to_vec(self).map_err(|e| FrameError::Encode(e.to_string()))
    }
}

/// A single data point inside a data frame.
///
/// `ts` and `qc` are optional on the wire; receivers fall back to the
/// receive time and good quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    /// Data point id assigned by the connector
    pub id: String,
    /// Current value
    pub val: serde_json::Value,
    /// Source timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    /// Quality code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc: Option<u8>,
}

/// A write frame published by a client on a write topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFrame {
    /// Client-assigned sequence number
    pub seq: u64,
    /// Values to write
    pub vals: Vec<WriteValue>,
}

impl WriteFrame {
    /// Create a frame writing a single value.
    #[must_use]
    pub fn single(seq: u64, id: impl Into<String>, val: serde_json::Value) -> Self {
        Self {
            seq,
            vals: vec![WriteValue {
                id: id.into(),
                val,
            }],
        }
    }

    /// Encode the frame to a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, FrameError> {
        serde_json::to_vec(self).map_err(|e| FrameError::Encode(e.to_string()))
    }

    /// Decode a write frame from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a valid write frame.
    pub fn from_json(payload: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(payload).map_err(|e| FrameError::Decode(e.to_string()))
    }
}

/// A single value inside a write frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteValue {
    /// Target data point id
    pub id: String,
    /// Value to write
    pub val: serde_json::Value,
}

/// Connector metadata announcing the available data points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFrame {
    /// Connector-assigned sequence number
    #[serde(default)]
    pub seq: u64,
    /// Configured connections
    #[serde(default)]
    pub connections: Vec<ConnectionMeta>,
}

impl MetadataFrame {
    /// Decode a metadata frame from a JSON payload.
    ///
    /// Unknown fields are ignored; connector metadata carries more than the
    /// data point definitions needed here.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not a valid metadata frame.
    pub fn from_json(payload: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(payload).map_err(|e| FrameError::Decode(e.to_string()))
    }
}

/// A connection entry in the metadata frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMeta {
    /// Connection name (the `{connection_name}` topic segment)
    pub name: String,
    /// Data point groups of this connection
    #[serde(default)]
    pub data_points: Vec<DataPointGroup>,
}

/// A group of data point definitions sharing a publish topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPointGroup {
    /// Group name
    pub name: String,
    /// Topic the group publishes on
    #[serde(default)]
    pub topic: Option<String>,
    /// Publish mode announced by the connector
    #[serde(default)]
    pub publish_type: Option<String>,
    /// The tag definitions
    #[serde(default)]
    pub data_point_definitions: Vec<DataPointDefinition>,
}

/// A single tag definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPointDefinition {
    /// Tag name
    pub name: String,
    /// Data point id used in data and write frames
    pub id: String,
    /// PLC data type announced by the connector
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Bidirectional mapping between tag names and data point ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDirectory {
    name_by_id: HashMap<String, String>,
    id_by_name: HashMap<String, String>,
}

impl TagDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a metadata frame.
    #[must_use]
    pub fn from_metadata(meta: &MetadataFrame) -> Self {
        let mut directory = Self::new();
        for connection in &meta.connections {
            for group in &connection.data_points {
                for definition in &group.data_point_definitions {
                    directory.insert(definition.name.clone(), definition.id.clone());
                }
            }
        }
        directory
    }

    /// Register a name ↔ id pair.
    ///
    /// Re-registering either side retires the displaced mapping, so a stale
    /// id can never keep resolving to a re-registered name.
    pub fn insert(&mut self, name: String, id: String) {
        if let Some(old_name) = self.name_by_id.insert(id.clone(), name.clone()) {
            if old_name != name {
                self.id_by_name.remove(&old_name);
            }
        }
        if let Some(old_id) = self.id_by_name.insert(name, id.clone()) {
            if old_id != id {
                self.name_by_id.remove(&old_id);
            }
        }
    }

    /// Resolve a data point id to its tag name.
    #[must_use]
    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.name_by_id.get(id).map(String::as_str)
    }

    /// Resolve a tag name to its data point id.
    #[must_use]
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.id_by_name.get(name).map(String::as_str)
    }

    /// Number of known tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_by_name.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_by_name.is_empty()
    }
}

/// Errors for frame encoding/decoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    /// Decoding failed
    #[error("frame decode failed: {0}")]
    Decode(String),
    /// Encoding failed
    #[error("frame encode failed: {0}")]
    Encode(String),
}
