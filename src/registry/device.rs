// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registered device: identity plus a lock-guarded tree.

use parking_lot::{Mutex, MutexGuard};

use crate::types::HealthRecord;

use super::node::Node;

/// Mutable part of a device, guarded by one per-device lock.
#[derive(Debug, Default)]
pub(crate) struct DeviceTree {
    pub nodes: Vec<Node>,
    pub health: HealthRecord,
    /// Bumped whenever a node or property is added.
    pub revision: u64,
    /// Revision of the last full announcement.
    pub announced: Option<u64>,
}

impl DeviceTree {
    pub fn node_position(&self, node_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == node_id)
    }
}

#[derive(Debug)]
pub(crate) struct Device {
    pub id: String,
    pub name: String,
    tree: Mutex<DeviceTree>,
}

impl Device {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            tree: Mutex::new(DeviceTree::default()),
        }
    }

    /// Refresh and command handling for one device serialize here.
    pub fn lock(&self) -> MutexGuard<'_, DeviceTree> {
        self.tree.lock()
    }
}
