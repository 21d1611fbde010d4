// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pushes values, metadata and the attribute tree to the transport.
//!
//! The publisher never polls and never reads a value on its own initiative:
//! it publishes what the registry holds at the moment it is asked to. Every
//! call publishes, whether or not the value changed since last time.
//!
//! Transport failures are logged and swallowed. They never change a
//! device's health; only a refresh outcome does that.

use std::sync::Arc;

use crate::error::Result;
use crate::property::{Metadata, PropertyDescriptor};
use crate::protocol::{Message, TopicLayout, Transport};
use crate::registry::{DeviceHandle, DeviceRegistry, PropertyHandle, PropertyPath};
use crate::types::HealthState;

/// Homie convention version announced in `$homie`.
pub const HOMIE_VERSION: &str = "4.0.0";

/// Publishes registry contents on a shared transport.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    layout: TopicLayout,
}

impl Publisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, layout: TopicLayout) -> Self {
        Self { transport, layout }
    }

    /// The topic layout in use.
    #[must_use]
    pub fn layout(&self) -> &TopicLayout {
        &self.layout
    }

    /// Publishes a property's current value and metadata.
    ///
    /// Nothing is published for the value while it is still unknown. Both
    /// value and metadata use the descriptor's retained flag and QoS.
    ///
    /// # Errors
    ///
    /// Returns a registry error for a foreign handle. Transport failures are
    /// logged, not returned.
    pub fn publish(&self, registry: &DeviceRegistry, property: PropertyHandle) -> Result<()> {
        let (path, snapshot) = registry.property_snapshot(property)?;
        let descriptor = &snapshot.descriptor;

        if let Some(value) = snapshot.state.value() {
            self.send(Message {
                topic: self.layout.property(&path),
                payload: value.to_payload(),
                retained: descriptor.is_retained(),
                qos: descriptor.qos(),
            });
        }
        self.publish_metadata(&path, descriptor, snapshot.state.metadata());
        Ok(())
    }

    /// Publishes a device's health state on `{device}/$state`.
    pub fn publish_health(&self, device_id: &str, state: HealthState) {
        self.send(Message::retained(
            self.layout.device_attribute(device_id, "$state"),
            state.as_str(),
        ));
    }

    /// Publishes the whole attribute tree of a device.
    ///
    /// Device, node and property `$` attributes plus the metadata of every
    /// property. Values are left to [`publish`](Self::publish).
    ///
    /// # Errors
    ///
    /// Returns a registry error for a foreign handle.
    pub fn announce(&self, registry: &DeviceRegistry, device: DeviceHandle) -> Result<()> {
        let snapshot = registry.snapshot(device)?;
        let d = snapshot.id.as_str();

        let attribute = |name: &str, payload: &str| {
            self.send(Message::retained(self.layout.device_attribute(d, name), payload));
        };
        attribute("$homie", HOMIE_VERSION);
        attribute("$name", &snapshot.name);
        attribute("$state", snapshot.state.as_str());
        let node_ids: Vec<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
        attribute("$nodes", &node_ids.join(","));

        for node in &snapshot.nodes {
            let n = node.id.as_str();
            let attribute = |name: &str, payload: &str| {
                self.send(Message::retained(
                    self.layout.node_attribute(d, n, name),
                    payload,
                ));
            };
            attribute("$name", &node.name);
            attribute("$type", &node.node_type);
            let property_ids: Vec<&str> =
                node.properties.iter().map(|p| p.descriptor.id()).collect();
            attribute("$properties", &property_ids.join(","));

            for property in &node.properties {
                let path = PropertyPath {
                    device: d.to_string(),
                    node: n.to_string(),
                    property: property.descriptor.id().to_string(),
                };
                self.publish_attributes(&path, &property.descriptor);
                self.publish_metadata(&path, &property.descriptor, property.state.metadata());
            }
        }

        registry.mark_announced(device, snapshot.revision)?;
        tracing::debug!(
            device = %d,
            nodes = snapshot.nodes.len(),
            revision = snapshot.revision,
            "Announced device tree"
        );
        Ok(())
    }

    fn publish_attributes(&self, path: &PropertyPath, descriptor: &PropertyDescriptor) {
        let attribute = |name: &str, payload: &str| {
            self.send(Message::retained(
                self.layout.property_attribute(path, name),
                payload,
            ));
        };
        attribute("$name", &descriptor.display_name());
        attribute("$datatype", descriptor.data_type().as_str());
        attribute("$settable", bool_token(descriptor.is_settable()));
        attribute("$retained", bool_token(descriptor.is_retained()));
        if let Some(unit) = descriptor.unit() {
            attribute("$unit", unit);
        }
        if let Some(format) = descriptor.constraints().format_attribute() {
            attribute("$format", &format);
        }
    }

    fn publish_metadata(
        &self,
        path: &PropertyPath,
        descriptor: &PropertyDescriptor,
        metadata: &Metadata,
    ) {
        if metadata.is_empty() {
            return;
        }

        let message = |suffix: String, payload: &str| Message {
            topic: self.layout.property_attribute(path, &suffix),
            payload: payload.to_string(),
            retained: descriptor.is_retained(),
            qos: descriptor.qos(),
        };

        let keys: Vec<&str> = metadata.keys().collect();
        self.send(message("$meta/$mainkey-ids".to_string(), &keys.join(",")));
        for (key, entry) in metadata.iter() {
            self.send(message(format!("$meta/{key}/$key"), &entry.name));
            self.send(message(format!("$meta/{key}/$value"), &entry.value));
        }
    }

    fn send(&self, message: Message) {
        let topic = message.topic.clone();
        match self.transport.publish(message) {
            Ok(()) => tracing::trace!(topic = %topic, "Published"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "Publish failed"),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn bool_token(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::QoS;
    use crate::protocol::MemoryTransport;
    use crate::registry::NodeSpec;

    fn setup(layout: TopicLayout) -> (Arc<MemoryTransport>, Publisher, DeviceRegistry) {
        let transport = Arc::new(MemoryTransport::new());
        let publisher = Publisher::new(transport.clone(), layout);
        (transport, publisher, DeviceRegistry::new())
    }

    #[test]
    fn publishes_value_under_property_topic() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let d1 = registry.register_device("d1", "Device 1").unwrap();
        let level = registry
            .declare_property(
                d1,
                &NodeSpec::default(),
                PropertyDescriptor::integer("level").with_range(0, 100),
            )
            .unwrap();

        registry.set_value(level, 42).unwrap();
        publisher.publish(&registry, level).unwrap();

        assert_eq!(transport.retained("d1/status/level").as_deref(), Some("42"));
    }

    #[test]
    fn unknown_value_is_not_published() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let d1 = registry.register_device("d1", "Device 1").unwrap();
        let level = registry
            .declare_property(d1, &NodeSpec::default(), PropertyDescriptor::integer("level"))
            .unwrap();

        publisher.publish(&registry, level).unwrap();
        assert!(transport.is_empty());
    }

    #[test]
    fn every_publish_is_sent_even_when_unchanged() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let d1 = registry.register_device("d1", "Device 1").unwrap();
        let level = registry
            .declare_property(d1, &NodeSpec::default(), PropertyDescriptor::integer("level"))
            .unwrap();
        registry.set_value(level, 7).unwrap();

        publisher.publish(&registry, level).unwrap();
        publisher.publish(&registry, level).unwrap();
        assert_eq!(transport.messages_to("d1/status/level").len(), 2);
    }

    #[test]
    fn volatile_property_uses_descriptor_flags() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let tv = registry.register_device("tv", "TV").unwrap();
        let key = registry
            .declare_property(
                tv,
                &NodeSpec::new("remote"),
                PropertyDescriptor::string("last-key")
                    .with_retained(false)
                    .with_qos(QoS::AtMostOnce),
            )
            .unwrap();
        registry.set_value(key, "power").unwrap();
        publisher.publish(&registry, key).unwrap();

        let sent = transport.messages_to("tv/remote/last-key");
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].retained);
        assert_eq!(sent[0].qos, QoS::AtMostOnce);
        assert!(transport.retained("tv/remote/last-key").is_none());
    }

    #[test]
    fn metadata_is_published_under_meta() {
        let (transport, publisher, registry) = setup(TopicLayout::with_base("homie"));
        let airly = registry.register_device("airly", "Airly").unwrap();
        let pm25 = registry
            .declare_property(airly, &NodeSpec::new("air"), PropertyDescriptor::float("pm25"))
            .unwrap();
        registry.set_value(pm25, 12.5).unwrap();
        registry
            .set_metadata(
                pm25,
                Metadata::new()
                    .with("Description", "Good air")
                    .with("Measured at", "12:00"),
            )
            .unwrap();

        publisher.publish(&registry, pm25).unwrap();

        let base = "homie/airly/air/pm25";
        assert_eq!(transport.retained(base).as_deref(), Some("12.5"));
        assert_eq!(
            transport.retained(&format!("{base}/$meta/$mainkey-ids")).as_deref(),
            Some("description,measured-at")
        );
        assert_eq!(
            transport.retained(&format!("{base}/$meta/measured-at/$key")).as_deref(),
            Some("Measured at")
        );
        assert_eq!(
            transport.retained(&format!("{base}/$meta/description/$value")).as_deref(),
            Some("Good air")
        );
    }

    #[test]
    fn metadata_without_usable_key_is_not_published() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let airly = registry.register_device("airly", "Airly").unwrap();
        let pm25 = registry
            .declare_property(airly, &NodeSpec::new("air"), PropertyDescriptor::float("pm25"))
            .unwrap();
        registry.set_value(pm25, 12.5).unwrap();
        registry
            .set_metadata(pm25, Metadata::new().with("!!!", "x").with("Index", "3"))
            .unwrap();

        publisher.publish(&registry, pm25).unwrap();

        assert_eq!(
            transport.retained("airly/air/pm25/$meta/$mainkey-ids").as_deref(),
            Some("index")
        );
        assert!(transport.messages().iter().all(|m| !m.topic.contains("$meta//")));
    }

    #[test]
    fn health_uses_state_topic() {
        let (transport, publisher, _) = setup(TopicLayout::new());
        publisher.publish_health("d1", HealthState::Alert);
        assert_eq!(transport.retained("d1/$state").as_deref(), Some("alert"));
    }

    #[test]
    fn announce_publishes_attribute_tree() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let printer = registry.register_device("printer", "HP PhotoSmart").unwrap();
        registry
            .declare_property(
                printer,
                &NodeSpec::new("ink").with_name("Ink levels"),
                PropertyDescriptor::integer("cyan").with_range(0, 100).with_unit("%"),
            )
            .unwrap();
        registry
            .declare_property(
                printer,
                &NodeSpec::default(),
                PropertyDescriptor::boolean("power").settable(|_| Ok(())),
            )
            .unwrap();

        assert!(registry.needs_announce(printer).unwrap());
        publisher.announce(&registry, printer).unwrap();
        assert!(!registry.needs_announce(printer).unwrap());

        let get = |topic: &str| transport.retained(topic);
        assert_eq!(get("printer/$homie").as_deref(), Some(HOMIE_VERSION));
        assert_eq!(get("printer/$name").as_deref(), Some("HP PhotoSmart"));
        assert_eq!(get("printer/$state").as_deref(), Some("init"));
        assert_eq!(get("printer/$nodes").as_deref(), Some("ink,status"));
        assert_eq!(get("printer/ink/$name").as_deref(), Some("Ink levels"));
        assert_eq!(get("printer/ink/$type").as_deref(), Some("ink"));
        assert_eq!(get("printer/ink/$properties").as_deref(), Some("cyan"));
        assert_eq!(get("printer/ink/cyan/$datatype").as_deref(), Some("integer"));
        assert_eq!(get("printer/ink/cyan/$unit").as_deref(), Some("%"));
        assert_eq!(get("printer/ink/cyan/$format").as_deref(), Some("0:100"));
        assert_eq!(get("printer/ink/cyan/$settable").as_deref(), Some("false"));
        assert_eq!(get("printer/status/power/$settable").as_deref(), Some("true"));
        assert!(get("printer/ink/cyan").is_none());
    }

    #[test]
    fn transport_failure_is_swallowed() {
        let (transport, publisher, registry) = setup(TopicLayout::new());
        let d1 = registry.register_device("d1", "Device 1").unwrap();
        let level = registry
            .declare_property(d1, &NodeSpec::default(), PropertyDescriptor::integer("level"))
            .unwrap();
        registry.set_value(level, 1).unwrap();

        transport.set_failing(true);
        assert!(publisher.publish(&registry, level).is_ok());
        assert!(publisher.announce(&registry, d1).is_ok());
    }
}
