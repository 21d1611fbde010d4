// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge events.
//!
//! Log output is the primary failure surface. The [`EventBus`] lets an
//! embedder observe the same transitions programmatically.
//!
//! # Examples
//!
//! ```
//! use homie_bridge::event::{BridgeEvent, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(BridgeEvent::DeviceRegistered {
//!     device: "printer".to_string(),
//! });
//! ```

mod bridge_event;
mod event_bus;

pub use bridge_event::BridgeEvent;
pub use event_bus::EventBus;
