// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutable per-property state: current value and metadata.

use std::collections::BTreeMap;

use crate::types::{Value, normalize_id};

/// One metadata entry: the original display key and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Key as given by the driver, before normalization.
    pub name: String,
    /// Entry value.
    pub value: String,
}

/// Metadata attached to a property reading, keyed by normalized key.
///
/// Typical entries are a measurement timestamp and a qualitative description
/// recomputed on every refresh.
///
/// # Examples
///
/// ```
/// use homie_bridge::property::Metadata;
///
/// let meta = Metadata::new()
///     .with("Measurement date", "2024-03-01 12:00:00")
///     .with("description", "Dobry");
///
/// assert_eq!(meta.get("measurement-date"), Some("2024-03-01 12:00:00"));
/// assert_eq!(meta.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, MetadataEntry>,
}

impl Metadata {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, keyed by the normalized form of `name`.
    ///
    /// A later entry whose name normalizes to the same key replaces the
    /// earlier one.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts an entry, keyed by the normalized form of `name`.
    ///
    /// Names that normalize to an empty key are skipped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = normalize_id(&name);
        if key.is_empty() {
            tracing::warn!(name = %name, "Skipping metadata entry with no usable key");
            return;
        }
        self.entries.insert(
            key,
            MetadataEntry {
                name,
                value: value.into(),
            },
        );
    }

    /// Looks up a value by normalized key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    /// Iterates over `(key, entry)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Normalized keys in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Current value and metadata of one property.
///
/// Only the owning device's refresh path writes here; the publisher reads a
/// snapshot and never mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyState {
    value: Option<Value>,
    metadata: Metadata,
}

impl PropertyState {
    /// Empty state: unknown value, no metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value, `None` while unknown.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Current metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Stores an already validated value.
    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Replaces the metadata wholesale.
    pub(crate) fn replace_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }
}
