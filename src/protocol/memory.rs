// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::ProtocolError;

use super::{Message, Transport};

/// Transport that records every publish instead of sending it.
///
/// Besides the full log it keeps a view of what a broker would hold as
/// retained messages, which is what a late subscriber would see.
///
/// # Examples
///
/// ```
/// use homie_bridge::protocol::{MemoryTransport, Message, Transport};
///
/// let transport = MemoryTransport::new();
/// transport.publish(Message::retained("d1/$state", "ready")).unwrap();
///
/// assert_eq!(transport.retained("d1/$state").as_deref(), Some("ready"));
/// assert_eq!(transport.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryTransport {
    log: Mutex<Vec<Message>>,
    retained: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail with [`ProtocolError::Closed`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// All messages published so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.log.lock().clone()
    }

    /// Messages published to `topic`, in order.
    #[must_use]
    pub fn messages_to(&self, topic: &str) -> Vec<Message> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Payload of the most recent publish to `topic`, retained or not.
    #[must_use]
    pub fn last(&self, topic: &str) -> Option<String> {
        self.log
            .lock()
            .iter()
            .rev()
            .find(|m| m.topic == topic)
            .map(|m| m.payload.clone())
    }

    /// Retained payload a late subscriber to `topic` would receive.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<String> {
        self.retained.lock().get(topic).cloned()
    }

    /// Number of messages published.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing was published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Forgets the log. Retained messages are kept, as on a broker.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl Transport for MemoryTransport {
    fn publish(&self, message: Message) -> Result<(), ProtocolError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(ProtocolError::Closed);
        }

        if message.retained {
            let mut retained = self.retained.lock();
            // An empty retained payload clears the topic on a broker.
            if message.payload.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.payload.clone());
            }
        }
        self.log.lock().push(message);
        Ok(())
    }
}
