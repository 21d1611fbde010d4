// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device, node and property registration.
//!
//! The [`DeviceRegistry`] owns the whole tree:
//!
//! ```text
//! DeviceRegistry
//!  └─ device "printer"            (DeviceHandle, health state)
//!      ├─ node "ink"              (NodeHandle)
//!      │   ├─ property "cyan"     (PropertyHandle → descriptor + value)
//!      │   └─ property "magenta"
//!      └─ node "status"
//!          └─ property "pages"
//! ```
//!
//! Registration is idempotent below the device level: re-declaring a node or
//! property returns the existing handle. Devices themselves must be unique.

mod device;
mod device_registry;
mod handle;
mod node;
mod snapshot;

use std::fmt;

pub use device_registry::DeviceRegistry;
pub use handle::{DeviceHandle, NodeHandle, PropertyHandle};
pub use node::{DEFAULT_NODE_ID, NodeSpec};
pub use snapshot::{DeviceSnapshot, NodeSnapshot, PropertySnapshot};

/// The `device/node/property` ids of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    /// Device id.
    pub device: String,
    /// Node id.
    pub node: String,
    /// Property id.
    pub property: String,
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device, self.node, self.property)
    }
}
