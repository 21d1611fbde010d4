// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pub/sub transport.
//!
//! The core talks to the broker through the [`Transport`] trait. One
//! transport instance is shared by every device; publishing is append-only
//! and never blocks on another device.
//!
//! # Implementations
//!
//! - [`MqttTransport`]: `rumqttc` connection (feature `mqtt`)
//! - [`MemoryTransport`]: records publishes in memory, for tests and dry runs

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod topic;

pub use memory::MemoryTransport;
#[cfg(feature = "mqtt")]
pub use mqtt::{InboundMessage, MqttTransport};
pub use topic::{SET_SUFFIX, SetTarget, TopicLayout};

use crate::error::ProtocolError;
use crate::property::QoS;

/// One outbound publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Full topic.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
    /// Whether the broker keeps the message for late subscribers.
    pub retained: bool,
    /// Delivery guarantee.
    pub qos: QoS,
}

impl Message {
    /// Retained message at QoS 1, used for attributes and state.
    #[must_use]
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retained: true,
            qos: QoS::AtLeastOnce,
        }
    }
}

/// A pub/sub connection the bridge can publish on.
///
/// `publish` must not block: implementations enqueue the message and return.
/// It is called from the refresh and command paths of every device
/// concurrently.
pub trait Transport: Send + Sync {
    /// Enqueues a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the message cannot be enqueued.
    fn publish(&self, message: Message) -> Result<(), ProtocolError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn publish(&self, message: Message) -> Result<(), ProtocolError> {
        (**self).publish(message)
    }
}
