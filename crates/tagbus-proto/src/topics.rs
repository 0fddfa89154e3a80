//! MQTT topic scheme for the databus.
//!
//! Topic structure:
//! - metadata: `{prefix}/m/j/{provider}/v1/{connection}/dp`
//! - data:     `{prefix}/d/j/{provider}/v1/{connection}/dp/r/{connection_name}`
//! - write:    `{prefix}/d/j/{provider}/v1/{connection}/dp/w/{connection_name}`
//!
//! The `m`/`d` segment separates metadata from data, `j` marks JSON payloads,
//! and the final `r`/`w` segment separates connector-published reads from
//! client-published writes.

use serde::{Deserialize, Serialize};

/// Protocol version segment used in all databus topics.
pub const PROTOCOL_VERSION: &str = "v1";

/// Databus topic scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Bus prefix (default: "ie")
    pub prefix: String,
    /// Data provider identifier (default: "simatic")
    pub provider: String,
    /// Connector instance identifier (default: "s7c1")
    pub connection: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: "ie".to_string(),
            provider: "simatic".to_string(),
            connection: "s7c1".to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a scheme with explicit prefix, provider, and connection.
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        provider: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            provider: provider.into(),
            connection: connection.into(),
        }
    }

    fn data_base(&self) -> String {
        format!(
            "{}/d/j/{}/{}/{}/dp",
            self.prefix, self.provider, PROTOCOL_VERSION, self.connection
        )
    }

    /// Topic on which the connector announces its data point definitions.
    #[must_use]
    pub fn metadata(&self) -> String {
        format!(
            "{}/m/j/{}/{}/{}/dp",
            self.prefix, self.provider, PROTOCOL_VERSION, self.connection
        )
    }

    /// Read topic for a named connection.
    #[must_use]
    pub fn read(&self, connection_name: &str) -> String {
        format!("{}/r/{connection_name}", self.data_base())
    }

    /// Wildcard subscription covering all read topics of this connector.
    #[must_use]
    pub fn read_wildcard(&self) -> String {
        format!("{}/r/#", self.data_base())
    }

    /// Write topic for a named connection.
    #[must_use]
    pub fn write(&self, connection_name: &str) -> String {
        format!("{}/w/{connection_name}", self.data_base())
    }

    /// Classify an incoming topic.
    ///
    /// Returns `None` for topics outside this scheme.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        if topic == self.metadata() {
            return Some(TopicKind::Metadata);
        }

        let prefix = format!("{}/", self.data_base());
        let remainder = topic.strip_prefix(prefix.as_str())?;
        let (direction, connection_name) = remainder.split_once('/')?;
        if connection_name.is_empty() {
            return None;
        }

        match direction {
            "r" => Some(TopicKind::Data {
                connection_name: connection_name.to_string(),
            }),
            "w" => Some(TopicKind::Write {
                connection_name: connection_name.to_string(),
            }),
            _ => None,
        }
    }
}

/// The role of a databus topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    /// Connector metadata (data point definitions)
    Metadata,
    /// Connector-published data frames
    Data {
        /// Connection name segment of the topic
        connection_name: String,
    },
    /// Client-published write frames
    Write {
        /// Connection name segment of the topic
        connection_name: String,
    },
}
