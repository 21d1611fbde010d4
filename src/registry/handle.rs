// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integer handles into the registry arena.
//!
//! Devices, nodes and properties are never removed, so an index handed out
//! once stays valid for the life of the registry.

use std::fmt;

/// Handle to a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub(crate) usize);

/// Handle to a node within a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    pub(crate) device: DeviceHandle,
    pub(crate) index: usize,
}

/// Handle to a property within a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyHandle {
    pub(crate) node: NodeHandle,
    pub(crate) index: usize,
}

impl NodeHandle {
    /// The owning device.
    #[must_use]
    pub fn device(&self) -> DeviceHandle {
        self.device
    }
}

impl PropertyHandle {
    /// The owning device.
    #[must_use]
    pub fn device(&self) -> DeviceHandle {
        self.node.device
    }

    /// The owning node.
    #[must_use]
    pub fn node(&self) -> NodeHandle {
        self.node
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.index)
    }
}

impl fmt::Display for PropertyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_dotted_path() {
        let handle = PropertyHandle {
            node: NodeHandle {
                device: DeviceHandle(2),
                index: 0,
            },
            index: 5,
        };
        assert_eq!(handle.to_string(), "#2.0.5");
        assert_eq!(handle.device(), DeviceHandle(2));
    }
}
