// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Failures fall into a small taxonomy, each with its own recovery policy:
//!
//! - [`ValidationError`]: a value or declaration violates a property's
//!   constraints. Rejected synchronously; stored state is unchanged.
//! - [`RegistryError`]: registration-time programmer errors such as a
//!   duplicate device id. Fatal at startup.
//! - [`DriverError`]: a vendor communication or state fault. Absorbed by the
//!   health state machine and logged; never propagated past a refresh or
//!   command boundary.
//! - [`DecodeError`]: a malformed inbound command payload. Dropped and logged.
//! - [`ProtocolError`]: a transport fault while publishing or connecting.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A value or declaration failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A registry lookup or registration failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A device driver reported a fault.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// An inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The pub/sub transport failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors raised when a value or a declaration breaks a property's contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// An integer value is outside the declared range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
        /// The value that was provided.
        actual: i64,
    },

    /// A float value is outside the declared range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    FloatOutOfRange {
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
        /// The value that was provided.
        actual: f64,
    },

    /// A float value is NaN or infinite.
    #[error("value {0} is not a finite number")]
    NotFinite(f64),

    /// The value's type does not match the property's data type.
    #[error("expected a {expected} value, got {actual}")]
    TypeMismatch {
        /// The declared data type.
        expected: &'static str,
        /// The type of the value that was provided.
        actual: &'static str,
    },

    /// An enum value is not one of the declared values.
    #[error("'{value}' is not one of [{allowed}]")]
    NotInEnum {
        /// The rejected value.
        value: String,
        /// Comma-separated list of allowed values.
        allowed: String,
    },

    /// Constraints do not fit the declared data type, or are empty/inverted.
    #[error("invalid constraints for property '{property}': {reason}")]
    InvalidConstraints {
        /// The property being declared.
        property: String,
        /// What is wrong with the constraints.
        reason: String,
    },

    /// An id is not topic-safe.
    #[error("'{0}' is not a valid topic identifier")]
    InvalidIdentifier(String),
}

/// Errors related to device, node and property registration or lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A device with this id is already registered.
    #[error("device '{0}' is already registered")]
    DuplicateDevice(String),

    /// No device is registered under this id or handle.
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    /// The device has no node with this id.
    #[error("device '{device}' has no node '{node}'")]
    UnknownNode {
        /// The device id.
        device: String,
        /// The missing node id.
        node: String,
    },

    /// The node has no property with this id.
    #[error("node '{device}/{node}' has no property '{property}'")]
    UnknownProperty {
        /// The device id.
        device: String,
        /// The node id.
        node: String,
        /// The missing property id.
        property: String,
    },

    /// A handle does not point into the registry's arena.
    #[error("stale or foreign handle {0}")]
    InvalidHandle(String),
}

/// Faults reported by a vendor-specific device driver.
///
/// Drivers apply their own timeout and retry policy before returning one of
/// these. The bridge treats every variant the same way: log it and move the
/// device to `ALERT` (refresh) or drop the command (command path).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The device or its vendor service could not be reached.
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device did not answer in time.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The device rejected a command.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The device answered with data that does not fit the declared tree.
    #[error("invalid reading for '{property}': {reason}")]
    InvalidReading {
        /// The property path the reading was addressed to.
        property: String,
        /// Why the reading was rejected.
        reason: String,
    },

    /// The driver does not support this operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Any other vendor fault.
    #[error("{0}")]
    Other(String),
}

/// Errors raised while decoding an inbound command payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// Boolean payloads must be exactly `true` or `false`.
    #[error("'{0}' is not a boolean (expected 'true' or 'false')")]
    InvalidBoolean(String),

    /// Payload is not an integer.
    #[error("'{0}' is not an integer")]
    InvalidInteger(String),

    /// Payload is not a finite float.
    #[error("'{0}' is not a number")]
    InvalidFloat(String),

    /// Payload is not one of the declared enum values.
    #[error("'{value}' is not one of [{allowed}]")]
    NotInEnum {
        /// The rejected payload.
        value: String,
        /// Comma-separated list of allowed values.
        allowed: String,
    },

    /// The decoded number violates the declared range.
    #[error("decoded value violates constraints: {0}")]
    OutOfRange(ValidationError),
}

/// Errors related to the pub/sub transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client failed to enqueue a request.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display() {
        let err = ValidationError::OutOfRange {
            min: 0,
            max: 100,
            actual: 150,
        };
        assert_eq!(err.to_string(), "value 150 is out of range [0, 100]");
    }

    #[test]
    fn error_from_registry_error() {
        let err: Error = RegistryError::DuplicateDevice("d1".to_string()).into();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::DuplicateDevice(ref id)) if id == "d1"
        ));
    }

    #[test]
    fn driver_error_display() {
        let err = DriverError::Unreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "device unreachable: connection refused");
    }

    #[test]
    fn decode_error_wraps_validation() {
        let err = DecodeError::OutOfRange(ValidationError::OutOfRange {
            min: 1,
            max: 100,
            actual: 0,
        });
        assert_eq!(
            err.to_string(),
            "decoded value violates constraints: value 0 is out of range [1, 100]"
        );
    }
}
