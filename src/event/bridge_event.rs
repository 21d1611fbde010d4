// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge event types.

use crate::types::HealthState;

/// Something observable happened in the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A device was added to the registry.
    DeviceRegistered {
        /// Device id.
        device: String,
    },

    /// A refresh changed a device's health state.
    HealthChanged {
        /// Device id.
        device: String,
        /// State before the refresh.
        from: HealthState,
        /// State after the refresh.
        to: HealthState,
        /// Cause of an `alert` transition.
        error: Option<String>,
    },

    /// A command was decoded and handed to its handler.
    CommandHandled {
        /// `device/node/property` of the target.
        target: String,
        /// Whether the handler succeeded.
        success: bool,
    },

    /// A command was dropped before reaching a handler.
    CommandDropped {
        /// Topic the command arrived on.
        topic: String,
        /// Why it was dropped.
        reason: String,
    },
}

impl BridgeEvent {
    /// Device id this event concerns, if it names one.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::DeviceRegistered { device } | Self::HealthChanged { device, .. } => Some(device),
            Self::CommandHandled { target, .. } => target.split('/').next(),
            Self::CommandDropped { .. } => None,
        }
    }

    /// Whether this is a transition into `alert`.
    #[must_use]
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::HealthChanged {
                to: HealthState::Alert,
                ..
            }
        )
    }
}
