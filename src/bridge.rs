// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge ties registry, publisher and dispatcher together.
//!
//! A refresh runs in this order:
//!
//! 1. `driver.status()`
//! 2. declarations are applied to the registry (idempotent)
//! 3. each reading is validated, stored, then published
//! 4. the health record moves to `ready`, or to `alert` on the first fault
//! 5. the attribute tree is re-announced if it grew
//! 6. `$state` is published
//!
//! A fault at step 1 or 3 abandons the remaining readings. Values stored
//! before the fault stay as they are. A panic inside `driver.status()` is
//! a fault like any other.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::driver::DeviceDriver;
use crate::error::{DriverError, Result};
use crate::event::{BridgeEvent, EventBus};
use crate::protocol::{TopicLayout, Transport};
use crate::publisher::Publisher;
use crate::registry::{DeviceHandle, DeviceRegistry, PropertyHandle};
use crate::types::{HealthState, RefreshOutcome, Value};

/// One bridge instance: the device tree plus its publish and command paths.
///
/// Shared as `Arc<Bridge>` between the scheduler and the transport's
/// inbound path.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use homie_bridge::Bridge;
/// use homie_bridge::config::BridgeConfig;
/// use homie_bridge::property::PropertyDescriptor;
/// use homie_bridge::protocol::MemoryTransport;
/// use homie_bridge::registry::NodeSpec;
///
/// # fn main() -> homie_bridge::Result<()> {
/// let transport = Arc::new(MemoryTransport::new());
/// let bridge = Bridge::new(transport.clone(), &BridgeConfig::default());
///
/// let d1 = bridge.register_device("d1", "Device 1")?;
/// let level = bridge.registry().declare_property(
///     d1,
///     &NodeSpec::default(),
///     PropertyDescriptor::integer("level").with_range(0, 100),
/// )?;
///
/// bridge.update(level, 42)?;
/// assert_eq!(transport.retained("d1/status/level").as_deref(), Some("42"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bridge {
    registry: Arc<DeviceRegistry>,
    publisher: Publisher,
    dispatcher: CommandDispatcher,
    events: EventBus,
    announce: bool,
}

impl Bridge {
    /// Creates a bridge publishing on `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: &BridgeConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let layout = TopicLayout::with_base(&config.base_topic);
        let events = EventBus::new();

        Self {
            publisher: Publisher::new(transport, layout.clone()),
            dispatcher: CommandDispatcher::new(Arc::clone(&registry), layout, events.clone()),
            registry,
            events,
            announce: config.announce,
        }
    }

    /// The device registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The publisher.
    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// The command dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers a device and announces it with state `init`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateDevice`](crate::error::RegistryError::DuplicateDevice)
    /// for a repeated id and a validation error for an id that is not
    /// topic-safe.
    pub fn register_device(&self, id: &str, name: &str) -> Result<DeviceHandle> {
        let handle = self.registry.register_device(id, name)?;
        if self.announce {
            self.publisher.announce(&self.registry, handle)?;
        } else {
            self.publisher.publish_health(id, HealthState::Init);
        }
        self.events.publish(BridgeEvent::DeviceRegistered {
            device: id.to_string(),
        });
        Ok(handle)
    }

    /// Validates, stores and publishes a value.
    ///
    /// # Errors
    ///
    /// Returns a validation error, leaving the stored value unchanged.
    pub fn update(&self, property: PropertyHandle, value: impl Into<Value>) -> Result<()> {
        self.registry.set_value(property, value)?;
        self.publisher.publish(&self.registry, property)
    }

    /// Publishes the attribute tree of every device.
    ///
    /// # Errors
    ///
    /// Only fails for registry inconsistencies.
    pub fn announce_all(&self) -> Result<()> {
        for device in self.registry.devices() {
            self.publisher.announce(&self.registry, device)?;
        }
        Ok(())
    }

    /// Runs one refresh of `device` and returns its new health state.
    ///
    /// Driver faults never escape: they move the device to `alert`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`](crate::error::RegistryError::InvalidHandle)
    /// for a foreign handle.
    pub fn refresh(&self, device: DeviceHandle, driver: &dyn DeviceDriver) -> Result<HealthState> {
        let device_id = self.registry.device_id(device)?;

        let outcome = match self.apply_status(device, &device_id, driver) {
            Ok(count) => {
                tracing::debug!(device = %device_id, readings = count, "Refresh succeeded");
                RefreshOutcome::Success
            }
            Err(e) => {
                tracing::warn!(device = %device_id, error = %e, "Refresh failed, device in alert");
                RefreshOutcome::Failure(e.to_string())
            }
        };
        let error = match &outcome {
            RefreshOutcome::Failure(cause) => Some(cause.clone()),
            RefreshOutcome::Success => None,
        };

        let (from, to) = self.registry.record_refresh(device, outcome)?;

        if self.announce && self.registry.needs_announce(device)? {
            self.publisher.announce(&self.registry, device)?;
        }
        self.publisher.publish_health(&device_id, to);

        if from != to {
            tracing::info!(device = %device_id, from = %from, to = %to, "Health changed");
            self.events.publish(BridgeEvent::HealthChanged {
                device: device_id,
                from,
                to,
                error,
            });
        }
        Ok(to)
    }

    /// Dispatches one inbound message.
    pub fn handle_command(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        self.dispatcher.dispatch(topic, payload)
    }

    /// Applies a driver status. Returns the number of readings stored.
    fn apply_status(
        &self,
        device: DeviceHandle,
        device_id: &str,
        driver: &dyn DeviceDriver,
    ) -> std::result::Result<usize, DriverError> {
        let status = std::panic::catch_unwind(AssertUnwindSafe(|| driver.status()))
            .map_err(|panic| {
                DriverError::Other(format!("driver panicked: {}", panic_message(&*panic)))
            })??;
        let (declarations, readings) = status.into_parts();

        for (node, descriptor) in declarations {
            let property = format!("{device_id}/{}/{}", node.id(), descriptor.id());
            self.registry
                .declare_property(device, &node, descriptor)
                .map_err(|e| invalid_reading(property, &e))?;
        }

        let count = readings.len();
        for reading in readings {
            let property = format!("{device_id}/{}/{}", reading.node, reading.property);
            let handle = self
                .registry
                .resolve(device_id, &reading.node, &reading.property)
                .map_err(|e| invalid_reading(property.clone(), &e))?;

            self.registry
                .set_value(handle, reading.value)
                .map_err(|e| invalid_reading(property.clone(), &e))?;
            if let Some(metadata) = reading.metadata {
                self.registry
                    .set_metadata(handle, metadata)
                    .map_err(|e| invalid_reading(property.clone(), &e))?;
            }
            self.publisher
                .publish(&self.registry, handle)
                .map_err(|e| invalid_reading(property, &e))?;
        }
        Ok(count)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn invalid_reading(property: String, error: &crate::Error) -> DriverError {
    DriverError::InvalidReading {
        property,
        reason: error.to_string(),
    }
}

#[cfg(feature = "mqtt")]
impl Bridge {
    /// Feeds inbound MQTT messages to the dispatcher.
    ///
    /// Each message is handled on tokio's blocking pool, since handlers call
    /// synchronous driver code. The task ends when the transport drops its
    /// sender.
    pub fn serve_commands(
        self: &Arc<Self>,
        mut inbound: tokio::sync::mpsc::Receiver<crate::protocol::InboundMessage>,
    ) -> tokio::task::JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let bridge = Arc::clone(&bridge);
                let result = tokio::task::spawn_blocking(move || {
                    bridge.handle_command(&message.topic, &message.payload)
                })
                .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Command handler panicked");
                }
            }
            tracing::debug!("Command stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DeviceStatus;
    use crate::property::{Metadata, PropertyDescriptor};
    use crate::protocol::MemoryTransport;
    use crate::registry::NodeSpec;
    use parking_lot::Mutex;

    /// Driver returning queued results, one per refresh.
    #[derive(Default)]
    struct Scripted {
        results: Mutex<Vec<std::result::Result<DeviceStatus, DriverError>>>,
    }

    impl Scripted {
        fn push(&self, result: std::result::Result<DeviceStatus, DriverError>) {
            self.results.lock().insert(0, result);
        }
    }

    impl DeviceDriver for Scripted {
        fn status(&self) -> std::result::Result<DeviceStatus, DriverError> {
            self.results
                .lock()
                .pop()
                .unwrap_or_else(|| Err(DriverError::Other("script exhausted".to_string())))
        }
    }

    fn bridge() -> (Arc<MemoryTransport>, Bridge) {
        let transport = Arc::new(MemoryTransport::new());
        let bridge = Bridge::new(transport.clone(), &BridgeConfig::default());
        (transport, bridge)
    }

    fn printer_status(cyan: i64) -> DeviceStatus {
        let mut status = DeviceStatus::new();
        status
            .declare(
                NodeSpec::new("ink").with_name("Ink"),
                PropertyDescriptor::integer("cyan").with_range(0, 100),
            )
            .reading("ink", "cyan", cyan);
        status
    }

    #[test]
    fn register_announces_init() {
        let (transport, bridge) = bridge();
        bridge.register_device("d1", "Device 1").unwrap();
        assert_eq!(transport.retained("d1/$state").as_deref(), Some("init"));
        assert_eq!(transport.retained("d1/$homie").as_deref(), Some("4.0.0"));
    }

    #[test]
    fn successful_refresh_goes_ready_and_publishes() {
        let (transport, bridge) = bridge();
        let printer = bridge.register_device("printer", "Printer").unwrap();
        let driver = Scripted::default();
        driver.push(Ok(printer_status(73)));

        let state = bridge.refresh(printer, &driver).unwrap();

        assert_eq!(state, HealthState::Ready);
        assert_eq!(transport.retained("printer/ink/cyan").as_deref(), Some("73"));
        assert_eq!(transport.retained("printer/$state").as_deref(), Some("ready"));
        assert_eq!(transport.retained("printer/$nodes").as_deref(), Some("ink"));
    }

    #[test]
    fn driver_error_goes_alert_and_keeps_values() {
        let (transport, bridge) = bridge();
        let printer = bridge.register_device("printer", "Printer").unwrap();
        let driver = Scripted::default();
        driver.push(Ok(printer_status(73)));
        driver.push(Err(DriverError::Unreachable("no route".to_string())));

        bridge.refresh(printer, &driver).unwrap();
        let state = bridge.refresh(printer, &driver).unwrap();

        assert_eq!(state, HealthState::Alert);
        assert_eq!(transport.retained("printer/$state").as_deref(), Some("alert"));
        assert_eq!(transport.retained("printer/ink/cyan").as_deref(), Some("73"));

        let health = bridge.registry().health(printer).unwrap();
        assert_eq!(health.failure_count(), 1);
        assert!(health.last_error().unwrap().contains("no route"));
    }

    #[test]
    fn panicking_driver_goes_alert() {
        struct Panics;

        impl DeviceDriver for Panics {
            fn status(&self) -> std::result::Result<DeviceStatus, DriverError> {
                panic!("socket closed");
            }
        }

        let (transport, bridge) = bridge();
        let printer = bridge.register_device("printer", "Printer").unwrap();
        let driver = Scripted::default();
        driver.push(Ok(printer_status(73)));
        bridge.refresh(printer, &driver).unwrap();

        let state = bridge.refresh(printer, &Panics).unwrap();

        assert_eq!(state, HealthState::Alert);
        assert_eq!(transport.retained("printer/$state").as_deref(), Some("alert"));
        assert_eq!(transport.retained("printer/ink/cyan").as_deref(), Some("73"));
        let health = bridge.registry().health(printer).unwrap();
        assert!(health.last_error().unwrap().contains("socket closed"));
    }

    #[test]
    fn invalid_reading_abandons_the_rest() {
        let (transport, bridge) = bridge();
        let printer = bridge.register_device("printer", "Printer").unwrap();

        let mut status = printer_status(50);
        status
            .declare("ink", PropertyDescriptor::integer("magenta").with_range(0, 100))
            .declare("ink", PropertyDescriptor::integer("yellow").with_range(0, 100))
            .reading("ink", "magenta", 140)
            .reading("ink", "yellow", 10);
        let driver = Scripted::default();
        driver.push(Ok(status));

        assert_eq!(bridge.refresh(printer, &driver).unwrap(), HealthState::Alert);
        assert_eq!(transport.retained("printer/ink/cyan").as_deref(), Some("50"));
        assert!(transport.retained("printer/ink/magenta").is_none());
        assert!(transport.retained("printer/ink/yellow").is_none());
    }

    #[test]
    fn reading_for_undeclared_property_is_a_fault() {
        let (_, bridge) = bridge();
        let tv = bridge.register_device("tv", "TV").unwrap();
        let mut status = DeviceStatus::new();
        status.reading("status", "volume", 10);
        let driver = Scripted::default();
        driver.push(Ok(status));

        assert_eq!(bridge.refresh(tv, &driver).unwrap(), HealthState::Alert);
    }

    #[test]
    fn recovery_from_alert() {
        let (_, bridge) = bridge();
        let printer = bridge.register_device("printer", "Printer").unwrap();
        let driver = Scripted::default();
        driver.push(Err(DriverError::Timeout(3000)));
        driver.push(Ok(printer_status(10)));

        assert_eq!(bridge.refresh(printer, &driver).unwrap(), HealthState::Alert);
        assert_eq!(bridge.refresh(printer, &driver).unwrap(), HealthState::Ready);
    }

    #[test]
    fn growing_tree_is_reannounced() {
        let (transport, bridge) = bridge();
        let hue = bridge.register_device("hue", "Hue").unwrap();
        let driver = Scripted::default();

        let mut first = DeviceStatus::new();
        first.declare(NodeSpec::new("salon"), PropertyDescriptor::boolean("ison"));
        let mut second = DeviceStatus::new();
        second
            .declare(NodeSpec::new("salon"), PropertyDescriptor::boolean("ison"))
            .declare(NodeSpec::new("kitchen"), PropertyDescriptor::boolean("ison"));
        driver.push(Ok(first));
        driver.push(Ok(second));

        bridge.refresh(hue, &driver).unwrap();
        assert_eq!(transport.retained("hue/$nodes").as_deref(), Some("salon"));
        bridge.refresh(hue, &driver).unwrap();
        assert_eq!(transport.retained("hue/$nodes").as_deref(), Some("salon,kitchen"));
        assert_eq!(transport.messages_to("hue/$homie").len(), 3);
    }

    #[test]
    fn metadata_is_replaced_on_each_refresh() {
        let (_, bridge) = bridge();
        let airly = bridge.register_device("airly", "Airly").unwrap();
        let driver = Scripted::default();
        for (value, description) in [(10.0, "Good"), (80.0, "Bad")] {
            let mut status = DeviceStatus::new();
            status
                .declare("air", PropertyDescriptor::float("pm10"))
                .reading_with_metadata(
                    "air",
                    "pm10",
                    value,
                    Metadata::new().with("description", description),
                );
            driver.push(Ok(status));
        }

        bridge.refresh(airly, &driver).unwrap();
        bridge.refresh(airly, &driver).unwrap();

        let pm10 = bridge.registry().resolve("airly", "air", "pm10").unwrap();
        let metadata = bridge.registry().metadata(pm10).unwrap();
        assert_eq!(metadata.get("description"), Some("Bad"));
        assert_eq!(metadata.len(), 1);
    }

    #[tokio::test]
    async fn health_changes_are_broadcast() {
        let (_, bridge) = bridge();
        let mut rx = bridge.events().subscribe();
        let printer = bridge.register_device("printer", "Printer").unwrap();
        let driver = Scripted::default();
        driver.push(Ok(printer_status(1)));
        driver.push(Ok(printer_status(2)));
        driver.push(Err(DriverError::Rejected("busy".to_string())));

        for _ in 0..3 {
            bridge.refresh(printer, &driver).unwrap();
        }

        assert!(matches!(
            rx.recv().await.unwrap(),
            BridgeEvent::DeviceRegistered { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            BridgeEvent::HealthChanged {
                from: HealthState::Init,
                to: HealthState::Ready,
                ..
            }
        ));
        let alert = rx.recv().await.unwrap();
        assert!(alert.is_alert());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn without_announce_only_state_is_published() {
        let transport = Arc::new(MemoryTransport::new());
        let config = BridgeConfig {
            announce: false,
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(transport.clone(), &config);
        bridge.register_device("d1", "Device 1").unwrap();

        assert_eq!(transport.retained("d1/$state").as_deref(), Some("init"));
        assert!(transport.retained("d1/$homie").is_none());
    }
}
