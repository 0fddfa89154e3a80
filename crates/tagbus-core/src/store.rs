//! In-memory tag store.

use crate::tag::Tag;
use std::collections::BTreeMap;

/// A mapping from tag name to current tag state.
///
/// Keys iterate in sorted order, so repeated enumerations of the store are
/// stable. The client hands out owned snapshots of this type; callers can
/// iterate without holding any lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagStore {
    tags: BTreeMap<String, Tag>,
}

impl TagStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the state of a named tag.
    pub fn upsert(&mut self, name: impl Into<String>, tag: Tag) {
        self.tags.insert(name.into(), tag);
    }

    /// Look up a tag by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// Whether a tag with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Number of tags in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over `(name, tag)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.tags.iter().map(|(name, tag)| (name.as_str(), tag))
    }

    /// Iterate over tag names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a TagStore {
    type Item = (&'a String, &'a Tag);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}
