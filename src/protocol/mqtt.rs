// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT transport.
//!
//! One connection serves every device. Publishing goes through
//! `try_publish`, which only enqueues into the client's request channel, so
//! a refresh never waits on the network. Inbound command messages arrive on
//! the receiver returned by [`MqttTransport::connect`].
//!
//! # Examples
//!
//! ```no_run
//! use homie_bridge::config::BrokerConfig;
//! use homie_bridge::protocol::{MqttTransport, TopicLayout};
//!
//! # async fn example() -> homie_bridge::Result<()> {
//! let config = BrokerConfig::builder()
//!     .host("192.168.1.50")
//!     .credentials("user", "password")
//!     .build()?;
//!
//! let (transport, mut commands) = MqttTransport::connect(&config, TopicLayout::new()).await?;
//! assert!(transport.is_connected());
//!
//! while let Some(message) = commands.recv().await {
//!     println!("command on {}", message.topic);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, oneshot};

use crate::config::BrokerConfig;
use crate::error::ProtocolError;

use super::{Message, TopicLayout, Transport};

/// Capacity of the client's request queue.
const REQUEST_CAPACITY: usize = 256;

/// Capacity of the inbound command channel.
const INBOUND_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// A message received on a command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic, e.g. `hue/salon/ison/set`.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Shared MQTT connection.
///
/// Cheaply cloneable; all clones publish on the same connection.
#[derive(Clone)]
pub struct MqttTransport {
    inner: Arc<Inner>,
}

struct Inner {
    client: AsyncClient,
    config: BrokerConfig,
    layout: TopicLayout,
    connected: AtomicBool,
    closing: AtomicBool,
}

impl MqttTransport {
    /// Connects to the broker and subscribes to every command topic.
    ///
    /// Spawns the event loop on the current tokio runtime and waits for the
    /// broker's ConnAck. The subscription is renewed after each reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`] if the broker refuses the
    /// connection or does not answer within the configured timeout.
    pub async fn connect(
        config: &BrokerConfig,
        layout: TopicLayout,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), ProtocolError> {
        if config.host().is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let client_id = client_id(config.client_id_prefix());
        let mut options = MqttOptions::new(&client_id, config.host(), config.port());
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let transport = Self {
            inner: Arc::new(Inner {
                client,
                config: config.clone(),
                layout,
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (connack_tx, connack_rx) = oneshot::channel();

        let events = transport.clone();
        tokio::spawn(async move {
            handle_events(event_loop, events, inbound_tx, connack_tx).await;
        });

        let timeout = config.connection_timeout();
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    host = %config.host(),
                    port = %config.port(),
                    client_id = %client_id,
                    "Connected to MQTT broker"
                );
                Ok((transport, inbound_rx))
            }
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated before ConnAck".to_string(),
            )),
            Err(_) => {
                transport.inner.closing.store(true, Ordering::Release);
                Err(ProtocolError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Topic layout used for the command subscription.
    #[must_use]
    pub fn layout(&self) -> &TopicLayout {
        &self.inner.layout
    }

    /// Closes the connection. The event loop exits once the broker
    /// acknowledges.
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect request cannot be enqueued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.config.host(),
            port = %self.inner.config.port(),
            "Disconnecting from MQTT broker"
        );
        self.inner.closing.store(true, Ordering::Release);
        self.inner.client.disconnect().await?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn subscribe_commands(&self) {
        let filter = self.inner.layout.set_filter();
        match self.inner.client.try_subscribe(&filter, QoS::AtLeastOnce) {
            Ok(()) => tracing::debug!(filter = %filter, "Subscribing to command topics"),
            Err(e) => tracing::warn!(filter = %filter, error = %e, "Failed to subscribe"),
        }
    }
}

impl Transport for MqttTransport {
    fn publish(&self, message: Message) -> Result<(), ProtocolError> {
        self.inner.client.try_publish(
            message.topic,
            message.qos.into(),
            message.retained,
            message.payload.into_bytes(),
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("host", &self.inner.config.host())
            .field("port", &self.inner.config.port())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn client_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Drives the rumqttc event loop for the life of the connection.
async fn handle_events(
    mut event_loop: EventLoop,
    transport: MqttTransport,
    inbound_tx: mpsc::Sender<InboundMessage>,
    connack_tx: oneshot::Sender<()>,
) {
    let mut connack_tx = Some(connack_tx);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                transport.inner.connected.store(true, Ordering::Release);
                transport.subscribe_commands();
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(topic = %publish.topic, "MQTT message received");
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if inbound_tx.send(message).await.is_err() {
                    tracing::debug!("Command receiver dropped, ignoring inbound message");
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                transport.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                transport.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                transport.inner.connected.store(false, Ordering::Release);
                if connack_tx.is_some() || transport.inner.closing.load(Ordering::Acquire) {
                    tracing::error!(error = %e, "MQTT event loop stopped");
                    break;
                }
                tracing::error!(error = %e, "MQTT connection error, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_unique_and_prefixed() {
        let a = client_id("bridge");
        let b = client_id("bridge");
        assert!(a.starts_with("bridge_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn connect_without_host_fails() {
        let result = MqttTransport::connect(&BrokerConfig::default(), TopicLayout::new()).await;
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let config = BrokerConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .connection_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let result = MqttTransport::connect(&config, TopicLayout::new()).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }
}
