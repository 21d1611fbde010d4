// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device registry arena.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RegistryError, Result};
use crate::property::{Metadata, PropertyDescriptor, PropertyState};
use crate::types::{HealthRecord, HealthState, RefreshOutcome, Value, validate_id};

use super::device::{Device, DeviceTree};
use super::node::{Node, NodeSpec, Property};
use super::snapshot::{DeviceSnapshot, NodeSnapshot, PropertySnapshot};
use super::{DeviceHandle, NodeHandle, PropertyHandle, PropertyPath};

#[derive(Debug, Default)]
struct RegistryInner {
    devices: Vec<Arc<Device>>,
    index: HashMap<String, usize>,
}

/// Owns every device, node and property for the life of the process.
///
/// Storage is an arena: a vector of devices, each owning a vector of nodes,
/// each owning a vector of properties. Entries are only ever appended, and
/// callers address them through the integer handles returned at
/// registration.
///
/// Each device sits behind its own lock, so a slow refresh of one device
/// never blocks reads or writes on another.
///
/// # Examples
///
/// ```
/// use homie_bridge::property::PropertyDescriptor;
/// use homie_bridge::registry::{DeviceRegistry, NodeSpec};
///
/// # fn main() -> homie_bridge::Result<()> {
/// let registry = DeviceRegistry::new();
/// let printer = registry.register_device("printer", "HP PhotoSmart")?;
///
/// let ink = NodeSpec::new("ink").with_name("Ink");
/// let cyan = registry.declare_property(
///     printer,
///     &ink,
///     PropertyDescriptor::integer("cyan").with_range(0, 100).with_unit("%"),
/// )?;
///
/// registry.set_value(cyan, 73)?;
/// assert_eq!(registry.value(cyan)?, Some(73.into()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `id` is not topic-safe and
    /// [`RegistryError::DuplicateDevice`] if it is already registered.
    pub fn register_device(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<DeviceHandle> {
        let id = id.into();
        validate_id(&id)?;

        let mut inner = self.inner.write();
        if inner.index.contains_key(&id) {
            return Err(RegistryError::DuplicateDevice(id).into());
        }

        let handle = DeviceHandle(inner.devices.len());
        inner.index.insert(id.clone(), handle.0);
        inner.devices.push(Arc::new(Device::new(id.clone(), name.into())));
        drop(inner);

        tracing::debug!(device = %id, %handle, "Registered device");
        Ok(handle)
    }

    /// Looks up a device by id.
    #[must_use]
    pub fn device(&self, id: &str) -> Option<DeviceHandle> {
        self.inner.read().index.get(id).copied().map(DeviceHandle)
    }

    /// Handles of all devices, in registration order.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceHandle> {
        (0..self.inner.read().devices.len()).map(DeviceHandle).collect()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().devices.len()
    }

    /// Whether no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn device_id(&self, device: DeviceHandle) -> Result<String> {
        Ok(self.get(device)?.id.clone())
    }

    /// Display name of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn display_name(&self, device: DeviceHandle) -> Result<String> {
        Ok(self.get(device)?.name.clone())
    }

    /// Health record of a device.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn health(&self, device: DeviceHandle) -> Result<HealthRecord> {
        Ok(self.get(device)?.lock().health.clone())
    }

    /// Applies a refresh outcome to a device's health record.
    ///
    /// Returns `(previous, current)` states.
    pub(crate) fn record_refresh(
        &self,
        device: DeviceHandle,
        outcome: RefreshOutcome,
    ) -> Result<(HealthState, HealthState)> {
        let device = self.get(device)?;
        let mut tree = device.lock();
        let previous = tree.health.record(outcome);
        Ok((previous, tree.health.state()))
    }

    // =========================================================================
    // Nodes and properties
    // =========================================================================

    /// Returns the node `spec.id()` of `device`, creating it if needed.
    ///
    /// A new node is appended after existing ones. For an existing node the
    /// call is a no-op: its name and type are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad node id and
    /// [`RegistryError::InvalidHandle`] for a foreign device handle.
    pub fn ensure_node(&self, device: DeviceHandle, spec: &NodeSpec) -> Result<NodeHandle> {
        let entry = self.get(device)?;
        let mut tree = entry.lock();
        Self::ensure_node_in(&entry.id, device, &mut tree, spec)
    }

    fn ensure_node_in(
        device_id: &str,
        device: DeviceHandle,
        tree: &mut DeviceTree,
        spec: &NodeSpec,
    ) -> Result<NodeHandle> {
        if let Some(index) = tree.node_position(spec.id()) {
            return Ok(NodeHandle { device, index });
        }

        validate_id(spec.id())?;
        tree.nodes.push(Node::from_spec(spec));
        tree.revision += 1;

        tracing::debug!(device = %device_id, node = %spec.id(), "Created node");
        Ok(NodeHandle {
            device,
            index: tree.nodes.len() - 1,
        })
    }

    /// Declares a property under `node` of `device`, creating the node if
    /// needed.
    ///
    /// Declaring a property id that already exists in that node is a no-op
    /// returning the existing handle; the new descriptor is discarded. This
    /// lets drivers re-run their topology discovery on every refresh.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a new descriptor's id or constraints
    /// are invalid.
    pub fn declare_property(
        &self,
        device: DeviceHandle,
        node: &NodeSpec,
        descriptor: PropertyDescriptor,
    ) -> Result<PropertyHandle> {
        let entry = self.get(device)?;
        let mut tree = entry.lock();
        let node = Self::ensure_node_in(&entry.id, device, &mut tree, node)?;
        Self::declare_in(&entry.id, &mut tree, node, descriptor)
    }

    /// Declares a property under an existing node.
    ///
    /// # Errors
    ///
    /// Same as [`declare_property`](Self::declare_property), plus
    /// [`RegistryError::InvalidHandle`] for a foreign node handle.
    pub fn declare_in_node(
        &self,
        node: NodeHandle,
        descriptor: PropertyDescriptor,
    ) -> Result<PropertyHandle> {
        let entry = self.get(node.device)?;
        let mut tree = entry.lock();
        Self::declare_in(&entry.id, &mut tree, node, descriptor)
    }

    fn declare_in(
        device_id: &str,
        tree: &mut DeviceTree,
        node: NodeHandle,
        descriptor: PropertyDescriptor,
    ) -> Result<PropertyHandle> {
        let entry = tree
            .nodes
            .get_mut(node.index)
            .ok_or_else(|| RegistryError::InvalidHandle(node.to_string()))?;

        if let Some(index) = entry.position(descriptor.id()) {
            tracing::trace!(
                device = %device_id,
                node = %entry.id,
                property = %descriptor.id(),
                "Property already declared"
            );
            return Ok(PropertyHandle { node, index });
        }

        descriptor.check()?;
        tracing::debug!(
            device = %device_id,
            node = %entry.id,
            property = %descriptor.id(),
            datatype = %descriptor.data_type(),
            settable = descriptor.is_settable(),
            "Declared property"
        );

        entry.properties.push(Property {
            descriptor: Arc::new(descriptor),
            state: PropertyState::new(),
        });
        let index = entry.properties.len() - 1;
        tree.revision += 1;

        Ok(PropertyHandle { node, index })
    }

    /// Finds a property by its path.
    ///
    /// # Errors
    ///
    /// Returns the [`RegistryError`] naming the first missing segment.
    pub fn resolve(&self, device_id: &str, node_id: &str, property_id: &str) -> Result<PropertyHandle> {
        let device = self
            .device(device_id)
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.to_string()))?;
        let entry = self.get(device)?;
        let tree = entry.lock();

        let node_index = tree
            .node_position(node_id)
            .ok_or_else(|| RegistryError::UnknownNode {
                device: device_id.to_string(),
                node: node_id.to_string(),
            })?;
        let index = tree.nodes[node_index]
            .position(property_id)
            .ok_or_else(|| RegistryError::UnknownProperty {
                device: device_id.to_string(),
                node: node_id.to_string(),
                property: property_id.to_string(),
            })?;

        Ok(PropertyHandle {
            node: NodeHandle {
                device,
                index: node_index,
            },
            index,
        })
    }

    /// Topic path of a property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn path(&self, property: PropertyHandle) -> Result<PropertyPath> {
        self.read_property(property, |device, node, prop| PropertyPath {
            device: device.to_string(),
            node: node.id.clone(),
            property: prop.descriptor.id().to_string(),
        })
    }

    /// Path, descriptor, value and metadata of a property, read under one
    /// device lock.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn property_snapshot(
        &self,
        property: PropertyHandle,
    ) -> Result<(PropertyPath, PropertySnapshot)> {
        self.read_property(property, |device, node, prop| {
            let path = PropertyPath {
                device: device.to_string(),
                node: node.id.clone(),
                property: prop.descriptor.id().to_string(),
            };
            let snapshot = PropertySnapshot {
                handle: property,
                descriptor: Arc::clone(&prop.descriptor),
                state: prop.state.clone(),
            };
            (path, snapshot)
        })
    }

    /// Descriptor of a property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn descriptor(&self, property: PropertyHandle) -> Result<Arc<PropertyDescriptor>> {
        self.read_property(property, |_, _, prop| Arc::clone(&prop.descriptor))
    }

    /// Current value of a property, `None` while unknown.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn value(&self, property: PropertyHandle) -> Result<Option<Value>> {
        self.read_property(property, |_, _, prop| prop.state.value().cloned())
    }

    /// Current metadata of a property.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn metadata(&self, property: PropertyHandle) -> Result<Metadata> {
        self.read_property(property, |_, _, prop| prop.state.metadata().clone())
    }

    /// Validates and stores a value.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the value breaks the descriptor's
    /// type or constraints; the stored value is left unchanged.
    pub fn set_value(&self, property: PropertyHandle, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.write_property(property, |device, node, prop| {
            let value = prop.descriptor.validate(value)?;
            tracing::trace!(
                device = %device,
                node = %node,
                property = %prop.descriptor.id(),
                value = %value,
                "Stored value"
            );
            prop.state.set_value(value);
            Ok(())
        })
    }

    /// Replaces a property's metadata wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn set_metadata(&self, property: PropertyHandle, metadata: Metadata) -> Result<()> {
        self.write_property(property, |_, _, prop| {
            prop.state.replace_metadata(metadata);
            Ok(())
        })
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Copies a whole device tree.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn snapshot(&self, device: DeviceHandle) -> Result<DeviceSnapshot> {
        let entry = self.get(device)?;
        let tree = entry.lock();

        let nodes = tree
            .nodes
            .iter()
            .enumerate()
            .map(|(node_index, node)| NodeSnapshot {
                id: node.id.clone(),
                name: node.name.clone(),
                node_type: node.node_type.clone(),
                properties: node
                    .properties
                    .iter()
                    .enumerate()
                    .map(|(index, prop)| PropertySnapshot {
                        handle: PropertyHandle {
                            node: NodeHandle {
                                device,
                                index: node_index,
                            },
                            index,
                        },
                        descriptor: Arc::clone(&prop.descriptor),
                        state: prop.state.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(DeviceSnapshot {
            id: entry.id.clone(),
            name: entry.name.clone(),
            state: tree.health.state(),
            revision: tree.revision,
            nodes,
        })
    }

    /// Whether the tree grew since the last full announcement.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for a foreign handle.
    pub fn needs_announce(&self, device: DeviceHandle) -> Result<bool> {
        let entry = self.get(device)?;
        let tree = entry.lock();
        Ok(tree.announced != Some(tree.revision))
    }

    pub(crate) fn mark_announced(&self, device: DeviceHandle, revision: u64) -> Result<()> {
        let entry = self.get(device)?;
        let mut tree = entry.lock();
        if tree.announced.is_none_or(|announced| announced < revision) {
            tree.announced = Some(revision);
        }
        Ok(())
    }

    // =========================================================================
    // Internal access
    // =========================================================================

    fn get(&self, device: DeviceHandle) -> std::result::Result<Arc<Device>, RegistryError> {
        self.inner
            .read()
            .devices
            .get(device.0)
            .cloned()
            .ok_or_else(|| RegistryError::InvalidHandle(device.to_string()))
    }

    fn read_property<T>(
        &self,
        handle: PropertyHandle,
        f: impl FnOnce(&str, &Node, &Property) -> T,
    ) -> Result<T> {
        let entry = self.get(handle.device())?;
        let tree = entry.lock();
        let node = tree
            .nodes
            .get(handle.node.index)
            .ok_or_else(|| RegistryError::InvalidHandle(handle.to_string()))?;
        let prop = node
            .properties
            .get(handle.index)
            .ok_or_else(|| RegistryError::InvalidHandle(handle.to_string()))?;
        Ok(f(&entry.id, node, prop))
    }

    fn write_property(
        &self,
        handle: PropertyHandle,
        f: impl FnOnce(&str, &str, &mut Property) -> Result<()>,
    ) -> Result<()> {
        let entry = self.get(handle.device())?;
        let mut tree = entry.lock();
        let node = tree
            .nodes
            .get_mut(handle.node.index)
            .ok_or_else(|| RegistryError::InvalidHandle(handle.to_string()))?;
        let node_id = node.id.clone();
        let prop = node
            .properties
            .get_mut(handle.index)
            .ok_or_else(|| RegistryError::InvalidHandle(handle.to_string()))?;
        f(&entry.id, &node_id, prop)
    }
}
