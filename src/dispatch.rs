// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound command routing.
//!
//! Commands are fire-and-forget. Anything that cannot be delivered to a
//! handler is dropped with a warning; nothing is ever reported back to the
//! sender. A handler's failure is logged and changes neither the stored
//! value nor the device health.

use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, DriverError, RegistryError};
use crate::event::{BridgeEvent, EventBus};
use crate::protocol::TopicLayout;
use crate::registry::DeviceRegistry;

/// Why a command never reached a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The topic is not a `.../set` command topic.
    NotACommand,
    /// No such device, node or property.
    UnknownTarget(RegistryError),
    /// The property is read-only.
    NotSettable,
    /// The payload did not decode for the property's data type.
    Decode(DecodeError),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotACommand => f.write_str("not a command topic"),
            Self::UnknownTarget(e) => write!(f, "{e}"),
            Self::NotSettable => f.write_str("property is not settable"),
            Self::Decode(e) => write!(f, "{e}"),
        }
    }
}

/// Result of dispatching one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The handler ran and succeeded.
    Handled,
    /// The handler ran and returned an error.
    HandlerFailed(DriverError),
    /// The message was dropped before reaching a handler.
    Dropped(DropReason),
}

impl DispatchOutcome {
    /// Whether a handler was invoked.
    #[must_use]
    pub fn reached_handler(&self) -> bool {
        !matches!(self, Self::Dropped(_))
    }
}

/// Routes `/set` messages to property handlers.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<DeviceRegistry>,
    layout: TopicLayout,
    events: EventBus,
}

impl CommandDispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, layout: TopicLayout, events: EventBus) -> Self {
        Self {
            registry,
            layout,
            events,
        }
    }

    /// Handles a raw inbound message.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let Some(target) = self.layout.parse_set(topic) else {
            return self.drop_message(topic, DropReason::NotACommand);
        };
        let Ok(payload) = std::str::from_utf8(payload) else {
            return self.drop_message(topic, DropReason::Decode(DecodeError::NotUtf8));
        };
        self.dispatch_to(topic, target.device, target.node, target.property, payload)
    }

    /// Handles a command already split into its target and payload.
    ///
    /// `topic` is only used for logging.
    pub fn dispatch_to(
        &self,
        topic: &str,
        device: &str,
        node: &str,
        property: &str,
        payload: &str,
    ) -> DispatchOutcome {
        let handle = match self.registry.resolve(device, node, property) {
            Ok(handle) => handle,
            Err(crate::Error::Registry(e)) => {
                return self.drop_message(topic, DropReason::UnknownTarget(e));
            }
            Err(e) => {
                return self.drop_message(
                    topic,
                    DropReason::UnknownTarget(RegistryError::InvalidHandle(e.to_string())),
                );
            }
        };

        // The descriptor is an Arc clone: no device lock is held from here on.
        let descriptor = match self.registry.descriptor(handle) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                return self.drop_message(
                    topic,
                    DropReason::UnknownTarget(RegistryError::InvalidHandle(e.to_string())),
                );
            }
        };

        let Some(handler) = descriptor.handler() else {
            return self.drop_message(topic, DropReason::NotSettable);
        };

        let value = match descriptor.decode(payload) {
            Ok(value) => value,
            Err(e) => return self.drop_message(topic, DropReason::Decode(e)),
        };

        let target = format!("{device}/{node}/{property}");
        let outcome = match handler.call(&value) {
            Ok(()) => {
                tracing::debug!(property = %target, value = %value, "Command handled");
                DispatchOutcome::Handled
            }
            Err(e) => {
                tracing::warn!(property = %target, value = %value, error = %e, "Command handler failed");
                DispatchOutcome::HandlerFailed(e)
            }
        };

        self.events.publish(BridgeEvent::CommandHandled {
            target,
            success: outcome == DispatchOutcome::Handled,
        });
        outcome
    }

    fn drop_message(&self, topic: &str, reason: DropReason) -> DispatchOutcome {
        tracing::warn!(topic = %topic, reason = %reason, "Dropped command");
        self.events.publish(BridgeEvent::CommandDropped {
            topic: topic.to_string(),
            reason: reason.to_string(),
        });
        DispatchOutcome::Dropped(reason)
    }
}

/// Splits a `target,duration` payload into its parts.
///
/// Some handlers accept a transition time after the target value. The
/// dispatcher never splits payloads itself; handlers call this when their
/// device supports it.
///
/// ```
/// use homie_bridge::dispatch::split_secondary;
///
/// assert_eq!(split_secondary("80,5"), ("80", Some("5")));
/// assert_eq!(split_secondary("80"), ("80", None));
/// ```
#[must_use]
pub fn split_secondary(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(',') {
        Some((primary, secondary)) => {
            let secondary = secondary.trim();
            (
                primary.trim(),
                (!secondary.is_empty()).then_some(secondary),
            )
        }
        None => (raw.trim(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyDescriptor;
    use crate::registry::NodeSpec;
    use crate::types::Value;
    use parking_lot::Mutex;

    fn setup() -> (Arc<DeviceRegistry>, CommandDispatcher) {
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&registry), TopicLayout::new(), EventBus::new());
        (registry, dispatcher)
    }

    #[test]
    fn settable_boolean_invokes_handler_once() {
        let (registry, dispatcher) = setup();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);

        let hue = registry.register_device("hue", "Hue bridge").unwrap();
        let ison = registry
            .declare_property(
                hue,
                &NodeSpec::new("salon"),
                PropertyDescriptor::boolean("ison").settable(move |value| {
                    seen.lock().push(value.clone());
                    Ok(())
                }),
            )
            .unwrap();

        let outcome = dispatcher.dispatch("hue/salon/ison/set", b"true");
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(calls.lock().as_slice(), [Value::Boolean(true)]);
        assert_eq!(registry.value(ison).unwrap(), None);
    }

    #[test]
    fn read_only_property_is_dropped() {
        let (registry, dispatcher) = setup();
        let d1 = registry.register_device("d1", "Device").unwrap();
        let level = registry
            .declare_property(d1, &NodeSpec::default(), PropertyDescriptor::integer("level"))
            .unwrap();
        registry.set_value(level, 42).unwrap();

        let outcome = dispatcher.dispatch("d1/status/level/set", b"7");
        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::NotSettable));
        assert_eq!(registry.value(level).unwrap(), Some(Value::Integer(42)));
    }

    #[test]
    fn unknown_targets_are_dropped() {
        let (registry, dispatcher) = setup();
        registry.register_device("d1", "Device").unwrap();

        assert!(matches!(
            dispatcher.dispatch("nope/status/level/set", b"1"),
            DispatchOutcome::Dropped(DropReason::UnknownTarget(RegistryError::UnknownDevice(_)))
        ));
        assert!(matches!(
            dispatcher.dispatch("d1/status/level/set", b"1"),
            DispatchOutcome::Dropped(DropReason::UnknownTarget(RegistryError::UnknownNode { .. }))
        ));
        assert_eq!(
            dispatcher.dispatch("d1/status/level", b"1"),
            DispatchOutcome::Dropped(DropReason::NotACommand)
        );
    }

    #[test]
    fn decode_failures_are_dropped() {
        let (registry, dispatcher) = setup();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);

        let fan = registry.register_device("fan", "Fan").unwrap();
        registry
            .declare_property(
                fan,
                &NodeSpec::default(),
                PropertyDescriptor::enumeration("speed", ["off", "low", "high"]).settable(
                    move |_| {
                        *counter.lock() += 1;
                        Ok(())
                    },
                ),
            )
            .unwrap();
        registry
            .declare_property(
                fan,
                &NodeSpec::default(),
                PropertyDescriptor::boolean("power").settable(|_| Ok(())),
            )
            .unwrap();

        assert!(matches!(
            dispatcher.dispatch("fan/status/speed/set", b"turbo"),
            DispatchOutcome::Dropped(DropReason::Decode(DecodeError::NotInEnum { .. }))
        ));
        assert!(matches!(
            dispatcher.dispatch("fan/status/power/set", b"TRUE"),
            DispatchOutcome::Dropped(DropReason::Decode(DecodeError::InvalidBoolean(_)))
        ));
        assert!(matches!(
            dispatcher.dispatch("fan/status/power/set", &[0xff, 0xfe]),
            DispatchOutcome::Dropped(DropReason::Decode(DecodeError::NotUtf8))
        ));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn handler_failure_is_reported_not_stored() {
        let (registry, dispatcher) = setup();
        let tv = registry.register_device("tv", "TV").unwrap();
        let volume = registry
            .declare_property(
                tv,
                &NodeSpec::default(),
                PropertyDescriptor::integer("volume")
                    .with_range(0, 100)
                    .settable(|_| Err(DriverError::Timeout(500))),
            )
            .unwrap();

        let outcome = dispatcher.dispatch("tv/status/volume/set", b"30");
        assert_eq!(outcome, DispatchOutcome::HandlerFailed(DriverError::Timeout(500)));
        assert!(outcome.reached_handler());
        assert_eq!(registry.value(volume).unwrap(), None);
        assert_eq!(
            registry.health(tv).unwrap().state(),
            crate::types::HealthState::Init
        );
    }

    #[test]
    fn handler_may_touch_the_registry() {
        let (registry, dispatcher) = setup();
        let lamp = registry.register_device("lamp", "Lamp").unwrap();
        let inner = Arc::clone(&registry);
        registry
            .declare_property(
                lamp,
                &NodeSpec::default(),
                PropertyDescriptor::boolean("power").settable(move |_| {
                    // Would deadlock if the dispatcher still held the device lock.
                    let _ = inner.snapshot(lamp);
                    Ok(())
                }),
            )
            .unwrap();

        assert_eq!(
            dispatcher.dispatch("lamp/status/power/set", b"false"),
            DispatchOutcome::Handled
        );
    }

    #[tokio::test]
    async fn events_are_emitted() {
        let (registry, dispatcher) = setup();
        let mut rx = dispatcher.events.subscribe();
        let d1 = registry.register_device("d1", "Device").unwrap();
        registry
            .declare_property(
                d1,
                &NodeSpec::default(),
                PropertyDescriptor::boolean("power").settable(|_| Ok(())),
            )
            .unwrap();

        dispatcher.dispatch("d1/status/power/set", b"true");
        dispatcher.dispatch("d1/status/power/set", b"yes");

        assert_eq!(
            rx.recv().await.unwrap(),
            BridgeEvent::CommandHandled {
                target: "d1/status/power".to_string(),
                success: true,
            }
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            BridgeEvent::CommandDropped { .. }
        ));
    }

    #[test]
    fn split_secondary_parameter() {
        assert_eq!(split_secondary("80,5"), ("80", Some("5")));
        assert_eq!(split_secondary(" 80 , 5 "), ("80", Some("5")));
        assert_eq!(split_secondary("80,"), ("80", None));
        assert_eq!(split_secondary("on"), ("on", None));
    }
}
