//! # tagbus Core
//!
//! Tag model and in-memory tag store for the tagbus databus client.
//!
//! This crate provides:
//! - Dynamically typed tag values as published by PLC connectors
//! - Databus quality codes
//! - The `Tag` triple (value, timestamp, quality) keyed by tag name
//! - A tag store with stable iteration order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod store;
pub mod tag;

pub use store::TagStore;
pub use tag::{Quality, Tag, TagValue};
