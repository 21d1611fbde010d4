// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seam to vendor-specific device code.
//!
//! A driver performs the I/O for one device. It is called synchronously,
//! from tokio's blocking pool, and applies its own timeout and retry policy
//! before returning.

use std::sync::Arc;

use crate::error::DriverError;
use crate::property::{CommandHandler, Metadata, PropertyDescriptor};
use crate::registry::NodeSpec;
use crate::types::Value;

/// Vendor-specific I/O for one device.
///
/// # Examples
///
/// ```
/// use homie_bridge::driver::{DeviceDriver, DeviceStatus};
/// use homie_bridge::error::DriverError;
/// use homie_bridge::property::PropertyDescriptor;
/// use homie_bridge::registry::NodeSpec;
///
/// struct Thermometer;
///
/// impl DeviceDriver for Thermometer {
///     fn status(&self) -> Result<DeviceStatus, DriverError> {
///         let mut status = DeviceStatus::new();
///         status.declare(
///             NodeSpec::default(),
///             PropertyDescriptor::float("temperature").with_unit("°C"),
///         );
///         status.reading("status", "temperature", 21.5);
///         Ok(status)
///     }
/// }
/// ```
pub trait DeviceDriver: Send + Sync {
    /// Fetches the current state of the device.
    ///
    /// Called once per refresh tick.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the device cannot be read. The device
    /// then goes to `alert`.
    fn status(&self) -> Result<DeviceStatus, DriverError>;

    /// Sends a command for one property.
    ///
    /// # Errors
    ///
    /// The default rejects every command with [`DriverError::Unsupported`].
    fn command(&self, property: &str, value: &Value) -> Result<(), DriverError> {
        let _ = value;
        Err(DriverError::Unsupported(format!("command for '{property}'")))
    }
}

impl<T: DeviceDriver + ?Sized> DeviceDriver for Arc<T> {
    fn status(&self) -> Result<DeviceStatus, DriverError> {
        (**self).status()
    }

    fn command(&self, property: &str, value: &Value) -> Result<(), DriverError> {
        (**self).command(property, value)
    }
}

/// One reading returned by [`DeviceDriver::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Node id.
    pub node: String,
    /// Property id.
    pub property: String,
    /// New value.
    pub value: Value,
    /// Replacement metadata, if the reading carries any.
    pub metadata: Option<Metadata>,
}

/// What a driver learned during one refresh.
///
/// Declarations are applied first, in order, and are idempotent, so a
/// driver that rediscovers its topology on every tick may declare the same
/// properties each time. Readings are then applied in order; the first one
/// that does not fit the tree aborts the rest.
#[derive(Debug, Default)]
pub struct DeviceStatus {
    declarations: Vec<(NodeSpec, PropertyDescriptor)>,
    readings: Vec<Reading>,
}

impl DeviceStatus {
    /// Empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property, creating its node if needed.
    pub fn declare(&mut self, node: impl Into<NodeSpec>, descriptor: PropertyDescriptor) -> &mut Self {
        self.declarations.push((node.into(), descriptor));
        self
    }

    /// Records a reading for `node/property`.
    pub fn reading(
        &mut self,
        node: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.readings.push(Reading {
            node: node.into(),
            property: property.into(),
            value: value.into(),
            metadata: None,
        });
        self
    }

    /// Records a reading together with metadata that replaces the old one.
    pub fn reading_with_metadata(
        &mut self,
        node: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<Value>,
        metadata: Metadata,
    ) -> &mut Self {
        self.readings.push(Reading {
            node: node.into(),
            property: property.into(),
            value: value.into(),
            metadata: Some(metadata),
        });
        self
    }

    /// Declarations, in order.
    #[must_use]
    pub fn declarations(&self) -> &[(NodeSpec, PropertyDescriptor)] {
        &self.declarations
    }

    /// Readings, in order.
    #[must_use]
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub(crate) fn into_parts(self) -> (Vec<(NodeSpec, PropertyDescriptor)>, Vec<Reading>) {
        (self.declarations, self.readings)
    }
}

impl CommandHandler {
    /// Handler that forwards to `driver.command(property, value)`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use homie_bridge::driver::{DeviceDriver, DeviceStatus};
    /// use homie_bridge::error::DriverError;
    /// use homie_bridge::property::{CommandHandler, PropertyDescriptor};
    ///
    /// struct Lamp;
    /// impl DeviceDriver for Lamp {
    ///     fn status(&self) -> Result<DeviceStatus, DriverError> {
    ///         Ok(DeviceStatus::new())
    ///     }
    /// }
    ///
    /// let driver: Arc<dyn DeviceDriver> = Arc::new(Lamp);
    /// let ison = PropertyDescriptor::boolean("ison")
    ///     .with_handler(CommandHandler::forward(&driver, "ison"));
    /// assert!(ison.is_settable());
    /// ```
    #[must_use]
    pub fn forward(driver: &Arc<dyn DeviceDriver>, property: impl Into<String>) -> Self {
        let driver = Arc::clone(driver);
        let property = property.into();
        Self::new(move |value| driver.command(&property, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<(String, Value)>>,
    }

    impl DeviceDriver for Recorder {
        fn status(&self) -> Result<DeviceStatus, DriverError> {
            Ok(DeviceStatus::new())
        }

        fn command(&self, property: &str, value: &Value) -> Result<(), DriverError> {
            self.commands.lock().push((property.to_string(), value.clone()));
            Ok(())
        }
    }

    struct ReadOnly;

    impl DeviceDriver for ReadOnly {
        fn status(&self) -> Result<DeviceStatus, DriverError> {
            Err(DriverError::Unreachable("offline".to_string()))
        }
    }

    #[test]
    fn status_builder_keeps_order() {
        let mut status = DeviceStatus::new();
        status
            .declare("ink", PropertyDescriptor::integer("cyan"))
            .declare("ink", PropertyDescriptor::integer("magenta"))
            .reading("ink", "cyan", 10)
            .reading_with_metadata("ink", "magenta", 20, Metadata::new().with("source", "cartridge"));

        let ids: Vec<&str> = status.declarations().iter().map(|(_, d)| d.id()).collect();
        assert_eq!(ids, ["cyan", "magenta"]);
        assert_eq!(status.readings()[0].value, Value::Integer(10));
        assert!(status.readings()[0].metadata.is_none());
        assert!(status.readings()[1].metadata.is_some());
    }

    #[test]
    fn forward_routes_to_driver() {
        let recorder = Arc::new(Recorder::default());
        let driver: Arc<dyn DeviceDriver> = recorder.clone();
        let handler = CommandHandler::forward(&driver, "ison");

        handler.call(&Value::Boolean(true)).unwrap();
        assert_eq!(
            recorder.commands.lock().as_slice(),
            [("ison".to_string(), Value::Boolean(true))]
        );
    }

    #[test]
    fn default_command_is_unsupported() {
        let driver: Arc<dyn DeviceDriver> = Arc::new(ReadOnly);
        let result = driver.command("power", &Value::Boolean(true));
        assert!(matches!(result, Err(DriverError::Unsupported(_))));
        assert!(driver.status().is_err());
    }
}
