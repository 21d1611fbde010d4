// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device health state machine.
//!
//! ```text
//!   INIT ──refresh ok──▶ READY ◀──refresh ok──┐
//!     │                    │                  │
//!     └──refresh failed──▶ ALERT ─────────────┘
//! ```
//!
//! Every refresh attempt ends in exactly one transition: success moves the
//! device to `READY`, any driver fault moves it to `ALERT`. Nothing else
//! changes the state; a device that is never refreshed stays in `INIT`.

use std::fmt;

use chrono::{DateTime, Utc};

/// Summary of a device's last refresh outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No refresh has completed yet.
    #[default]
    Init,
    /// The last refresh succeeded.
    Ready,
    /// The last refresh failed.
    Alert,
}

impl HealthState {
    /// Returns the `$state` payload for this state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one refresh attempt, fed to [`HealthRecord::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh completed without a fault.
    Success,
    /// The driver reported a fault; the message is kept for diagnostics.
    Failure(String),
}

/// Health bookkeeping for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    state: HealthState,
    since: DateTime<Utc>,
    last_error: Option<String>,
    refresh_count: u64,
    failure_count: u64,
}

impl HealthRecord {
    /// Creates a record in the `INIT` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HealthState::Init,
            since: Utc::now(),
            last_error: None,
            refresh_count: 0,
            failure_count: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HealthState {
        self.state
    }

    /// When the current state was entered.
    #[must_use]
    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Cause of the most recent failed refresh, cleared on success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of refresh attempts recorded.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    /// Number of failed refresh attempts recorded.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Applies a refresh outcome and returns the previous state.
    ///
    /// `since` only moves when the state actually changes.
    pub fn record(&mut self, outcome: RefreshOutcome) -> HealthState {
        let previous = self.state;
        self.refresh_count += 1;

        self.state = match outcome {
            RefreshOutcome::Success => {
                self.last_error = None;
                HealthState::Ready
            }
            RefreshOutcome::Failure(cause) => {
                self.failure_count += 1;
                self.last_error = Some(cause);
                HealthState::Alert
            }
        };

        if self.state != previous {
            self.since = Utc::now();
        }
        previous
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}
