// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point-in-time copies of a device tree.
//!
//! Snapshots let the publisher walk a tree without holding the device lock
//! while it talks to the transport.

use std::sync::Arc;

use crate::property::{PropertyDescriptor, PropertyState};
use crate::types::HealthState;

use super::PropertyHandle;

/// Copy of one property.
#[derive(Debug, Clone)]
pub struct PropertySnapshot {
    /// Handle of the property.
    pub handle: PropertyHandle,
    /// Shared immutable descriptor.
    pub descriptor: Arc<PropertyDescriptor>,
    /// Value and metadata at snapshot time.
    pub state: PropertyState,
}

/// Copy of one node and its properties, in declaration order.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    /// Node id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form type.
    pub node_type: String,
    /// Properties in declaration order.
    pub properties: Vec<PropertySnapshot>,
}

/// Copy of a whole device tree, nodes in creation order.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    /// Device id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Health state at snapshot time.
    pub state: HealthState,
    /// Tree revision the snapshot was taken at.
    pub revision: u64,
    /// Nodes in creation order.
    pub nodes: Vec<NodeSnapshot>,
}

impl DeviceSnapshot {
    /// Finds a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

impl NodeSnapshot {
    /// Finds a property by id.
    #[must_use]
    pub fn property(&self, id: &str) -> Option<&PropertySnapshot> {
        self.properties.iter().find(|p| p.descriptor.id() == id)
    }
}
