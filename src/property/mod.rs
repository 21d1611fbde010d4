// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property definitions and their mutable state.
//!
//! - [`PropertyDescriptor`]: immutable definition (type, constraints, access)
//! - [`PropertyState`]: current value and [`Metadata`]

mod descriptor;
mod state;

pub use descriptor::{Access, CommandHandler, Constraints, PropertyDescriptor, QoS};
pub use state::{Metadata, MetadataEntry, PropertyState};
