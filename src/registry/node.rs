// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nodes: named groups of properties within a device.

use std::sync::Arc;

use crate::property::{PropertyDescriptor, PropertyState};
use crate::types::display_name_for;

/// Node id used when a property is declared without one.
pub const DEFAULT_NODE_ID: &str = "status";

/// How to create a node if it does not exist yet.
///
/// Name and type only matter the first time a node id is seen; an existing
/// node keeps the values it was created with.
///
/// # Examples
///
/// ```
/// use homie_bridge::registry::NodeSpec;
///
/// let ink = NodeSpec::new("ink").with_name("Ink levels");
/// assert_eq!(ink.id(), "ink");
/// assert_eq!(ink.display_name(), "Ink levels");
/// assert_eq!(ink.node_type(), "ink");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    id: String,
    name: Option<String>,
    node_type: Option<String>,
}

impl NodeSpec {
    /// Spec for node `id`, named after the id and typed as the id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            node_type: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the free-form node type (e.g. `group`, `status`).
    #[must_use]
    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, defaulting to the capitalized id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| display_name_for(&self.id))
    }

    /// Node type, defaulting to the id.
    #[must_use]
    pub fn node_type(&self) -> &str {
        self.node_type.as_deref().unwrap_or(&self.id)
    }
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_ID)
    }
}

impl From<&str> for NodeSpec {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug)]
pub(crate) struct Property {
    pub descriptor: Arc<PropertyDescriptor>,
    pub state: PropertyState,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub properties: Vec<Property>,
}

impl Node {
    pub fn from_spec(spec: &NodeSpec) -> Self {
        Self {
            id: spec.id().to_string(),
            name: spec.display_name(),
            node_type: spec.node_type().to_string(),
            properties: Vec::new(),
        }
    }

    pub fn position(&self, property_id: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.descriptor.id() == property_id)
    }
}
