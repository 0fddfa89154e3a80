//! # tagbus Proto
//!
//! Databus topic scheme and JSON wire frames.
//!
//! This crate provides:
//! - The databus MQTT topic layout (metadata, data, and write topics)
//! - Data, write, and metadata frame types with JSON encode/decode
//! - The tag directory mapping tag names to data point ids

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frames;
pub mod topics;

pub use frames::{
    ConnectionMeta, DataFrame, DataPoint, DataPointDefinition, DataPointGroup, FrameError,
    MetadataFrame, TagDirectory, WriteFrame, WriteValue,
};
pub use topics::{TopicKind, TopicScheme};
