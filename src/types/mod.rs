// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core value types shared by the registry, publisher and dispatcher.

mod health;
mod identifier;
mod value;

pub use health::{HealthRecord, HealthState, RefreshOutcome};
pub use identifier::{display_name_for, is_valid_id, normalize_id, validate_id};
pub use value::{DataType, Value};
