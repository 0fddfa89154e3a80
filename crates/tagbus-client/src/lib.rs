//! # tagbus Client
//!
//! Async MQTT client maintaining a live PLC tag store.
//!
//! ## Architecture
//!
//! The client runs one background ingest task polling the MQTT event loop:
//! - Metadata frames rebuild the tag directory (name ↔ data point id)
//! - Data frames update the shared tag store while listening is enabled
//! - Subscriptions are re-issued on every connection acknowledgement, so
//!   they survive broker reconnects
//!
//! The [`Databus`] handle is cheap to clone. Reads hand out owned snapshots
//! of the store; writes publish databus write frames to a runtime-adjustable
//! write topic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;

pub use client::{Databus, DatabusError};
pub use config::{ConfigError, DatabusConfig};

pub use tagbus_core::{Quality, Tag, TagStore, TagValue};
