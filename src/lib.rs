// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Homie Bridge - expose independently polled devices as a property tree.
//!
//! Many unrelated devices (air-quality stations, light bridges, printers,
//! TVs, humidifiers) share one broker connection and appear as a uniform
//! tree of typed, addressable properties:
//!
//! ```text
//! {device}/$state                   init | ready | alert
//! {device}/{node}/{property}        retained value
//! {device}/{node}/{property}/set    inbound command
//! ```
//!
//! Vendor I/O stays behind the [`DeviceDriver`](driver::DeviceDriver)
//! trait. This crate owns everything between the driver and the broker.
//!
//! # Components
//!
//! - **Identifiers**: [`normalize_id`](types::normalize_id) turns display
//!   strings into topic-safe ids
//! - **Registry**: [`DeviceRegistry`](registry::DeviceRegistry) holds devices,
//!   nodes and typed properties, addressed by integer handles
//! - **Publisher**: [`Publisher`](publisher::Publisher) pushes values,
//!   metadata and the `$` attribute tree
//! - **Dispatcher**: [`CommandDispatcher`](dispatch::CommandDispatcher)
//!   routes `/set` messages to property handlers
//! - **Scheduler**: [`Scheduler`] refreshes each device on its own interval
//!   and tracks its health
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use homie_bridge::config::{BridgeConfig, BrokerConfig, DeviceConfig};
//! use homie_bridge::driver::{DeviceDriver, DeviceStatus};
//! use homie_bridge::error::DriverError;
//! use homie_bridge::property::PropertyDescriptor;
//! use homie_bridge::protocol::{MqttTransport, TopicLayout};
//! use homie_bridge::{Bridge, Scheduler};
//!
//! struct Printer;
//!
//! impl DeviceDriver for Printer {
//!     fn status(&self) -> Result<DeviceStatus, DriverError> {
//!         let mut status = DeviceStatus::new();
//!         status
//!             .declare("ink", PropertyDescriptor::integer("cyan").with_range(0, 100))
//!             .reading("ink", "cyan", 73);
//!         Ok(status)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> homie_bridge::Result<()> {
//!     let config = BridgeConfig::default();
//!     let broker = BrokerConfig::builder().host("192.168.1.50").build()?;
//!     let (transport, commands) = MqttTransport::connect(&broker, TopicLayout::new()).await?;
//!
//!     let bridge = Arc::new(Bridge::new(Arc::new(transport), &config));
//!     let _inbound = bridge.serve_commands(commands);
//!
//!     let mut scheduler = Scheduler::new(Arc::clone(&bridge), &config)?;
//!     scheduler.add(&DeviceConfig::new("printer", "printer"), Arc::new(Printer))?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `mqtt` (default): the `rumqttc` transport. Without it the crate still
//!   builds against the [`Transport`](protocol::Transport) trait.

mod bridge;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod event;
pub mod property;
pub mod protocol;
pub mod publisher;
pub mod registry;
mod scheduler;
pub mod types;

pub use bridge::Bridge;
pub use dispatch::{CommandDispatcher, DispatchOutcome, DropReason, split_secondary};
pub use driver::{DeviceDriver, DeviceStatus};
pub use error::{
    DecodeError, DriverError, Error, ProtocolError, RegistryError, Result, ValidationError,
};
pub use property::{Access, CommandHandler, Constraints, Metadata, PropertyDescriptor, QoS};
pub use registry::{DeviceHandle, DeviceRegistry, NodeHandle, NodeSpec, PropertyHandle};
pub use scheduler::Scheduler;
pub use types::{DataType, HealthState, Value, normalize_id};
