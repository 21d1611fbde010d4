// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property descriptors.
//!
//! A [`PropertyDescriptor`] is the immutable definition of one addressable
//! value: its id, data type, constraints, delivery policy and whether it
//! accepts commands. Descriptors are built with chained `with_*` calls and
//! frozen once declared in the registry.

use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, DriverError, ValidationError};
use crate::types::{DataType, Value, display_name_for, validate_id};

/// Delivery guarantee used when publishing a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Delivered at least once.
    #[default]
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

#[cfg(feature = "mqtt")]
impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// Value constraints of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraints {
    /// No constraints.
    None,
    /// Inclusive integer range.
    IntegerRange {
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },
    /// Inclusive float range.
    FloatRange {
        /// Lowest accepted value.
        min: f64,
        /// Highest accepted value.
        max: f64,
    },
    /// Ordered list of accepted enum values.
    Enum(Vec<String>),
    /// Free-form format hint for string properties; not enforced.
    Format(String),
}

impl Constraints {
    /// Renders the `$format` attribute, if any.
    #[must_use]
    pub fn format_attribute(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::IntegerRange { min, max } => Some(format!("{min}:{max}")),
            Self::FloatRange { min, max } => Some(format!("{min}:{max}")),
            Self::Enum(values) => Some(values.join(",")),
            Self::Format(format) => Some(format.clone()),
        }
    }
}

/// Callback invoked with a decoded command value.
///
/// Handlers usually forward to the device driver. A returned
/// [`DriverError`] is logged by the dispatcher and otherwise ignored.
#[derive(Clone)]
pub struct CommandHandler(Arc<dyn Fn(&Value) -> Result<(), DriverError> + Send + Sync>);

impl CommandHandler {
    /// Wraps a closure.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Result<(), DriverError> + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    /// Invokes the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever the wrapped closure returns.
    pub fn call(&self, value: &Value) -> Result<(), DriverError> {
        (self.0)(value)
    }
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CommandHandler(..)")
    }
}

/// Whether a property accepts commands.
///
/// A settable property carries its handler; the binding is made at creation
/// and cannot be changed afterwards.
#[derive(Debug, Clone, Default)]
pub enum Access {
    /// State only.
    #[default]
    ReadOnly,
    /// Accepts commands on the `/set` topic.
    Settable(CommandHandler),
}

/// Immutable definition of a property.
///
/// # Examples
///
/// ```
/// use homie_bridge::property::PropertyDescriptor;
///
/// let brightness = PropertyDescriptor::integer("brightness")
///     .with_range(1, 100)
///     .with_unit("%")
///     .settable(|value| {
///         println!("set brightness to {value}");
///         Ok(())
///     });
///
/// assert!(brightness.is_settable());
/// assert_eq!(brightness.display_name(), "Brightness");
/// ```
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    id: String,
    name: Option<String>,
    data_type: DataType,
    unit: Option<String>,
    retained: bool,
    qos: QoS,
    constraints: Constraints,
    access: Access,
}

impl PropertyDescriptor {
    /// Creates a read-only, retained descriptor without constraints.
    #[must_use]
    pub fn new(id: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            name: None,
            data_type,
            unit: None,
            retained: true,
            qos: QoS::default(),
            constraints: Constraints::None,
            access: Access::ReadOnly,
        }
    }

    /// Boolean property.
    #[must_use]
    pub fn boolean(id: impl Into<String>) -> Self {
        Self::new(id, DataType::Boolean)
    }

    /// Integer property.
    #[must_use]
    pub fn integer(id: impl Into<String>) -> Self {
        Self::new(id, DataType::Integer)
    }

    /// Float property.
    #[must_use]
    pub fn float(id: impl Into<String>) -> Self {
        Self::new(id, DataType::Float)
    }

    /// String property.
    #[must_use]
    pub fn string(id: impl Into<String>) -> Self {
        Self::new(id, DataType::String)
    }

    /// Enum property with its ordered list of values.
    #[must_use]
    pub fn enumeration<I, S>(id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut descriptor = Self::new(id, DataType::Enum);
        descriptor.constraints = Constraints::Enum(values.into_iter().map(Into::into).collect());
        descriptor
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Restricts an integer property to `min..=max`.
    #[must_use]
    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.constraints = Constraints::IntegerRange { min, max };
        self
    }

    /// Restricts a float property to `min..=max`.
    #[must_use]
    pub fn with_float_range(mut self, min: f64, max: f64) -> Self {
        self.constraints = Constraints::FloatRange { min, max };
        self
    }

    /// Attaches a free-form format hint to a string property.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.constraints = Constraints::Format(format.into());
        self
    }

    /// Sets whether published values are retained by the broker.
    #[must_use]
    pub fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Sets the delivery QoS.
    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Makes the property settable, binding `handler` to its `/set` topic.
    #[must_use]
    pub fn settable<F>(self, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<(), DriverError> + Send + Sync + 'static,
    {
        self.with_handler(CommandHandler::new(handler))
    }

    /// Makes the property settable with an existing handler.
    #[must_use]
    pub fn with_handler(mut self, handler: CommandHandler) -> Self {
        self.access = Access::Settable(handler);
        self
    }

    /// Property id, unique within its node.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name; derived from the id when none was given.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| display_name_for(&self.id))
    }

    /// Declared data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Unit, if any.
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Whether values are published retained.
    #[must_use]
    pub fn is_retained(&self) -> bool {
        self.retained
    }

    /// Delivery QoS.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    /// Declared constraints.
    #[must_use]
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Access mode.
    #[must_use]
    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Whether the property accepts commands.
    #[must_use]
    pub fn is_settable(&self) -> bool {
        matches!(self.access, Access::Settable(_))
    }

    /// Returns the bound command handler, if settable.
    #[must_use]
    pub fn handler(&self) -> Option<&CommandHandler> {
        match &self.access {
            Access::Settable(handler) => Some(handler),
            Access::ReadOnly => None,
        }
    }

    /// Checks the id and that the constraints fit the data type.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidIdentifier`] for a bad id and
    /// [`ValidationError::InvalidConstraints`] for mismatched, empty or
    /// inverted constraints.
    pub fn check(&self) -> Result<(), ValidationError> {
        validate_id(&self.id)?;

        let invalid = |reason: &str| ValidationError::InvalidConstraints {
            property: self.id.clone(),
            reason: reason.to_string(),
        };

        match (&self.constraints, self.data_type) {
            (Constraints::None, DataType::Enum) => Err(invalid("enum without values")),
            (Constraints::None, _) => Ok(()),
            (Constraints::IntegerRange { min, max }, DataType::Integer) => {
                if min > max {
                    Err(invalid("range minimum above maximum"))
                } else {
                    Ok(())
                }
            }
            (Constraints::FloatRange { min, max }, DataType::Float) => {
                if !min.is_finite() || !max.is_finite() || min > max {
                    Err(invalid("range bounds must be finite and ordered"))
                } else {
                    Ok(())
                }
            }
            (Constraints::Enum(values), DataType::Enum) => {
                if values.is_empty() {
                    Err(invalid("enum without values"))
                } else if values.iter().any(|v| v.is_empty() || v.contains(',')) {
                    Err(invalid("enum values must be non-empty and comma-free"))
                } else {
                    Ok(())
                }
            }
            (Constraints::Format(_), DataType::String) => Ok(()),
            (constraints, data_type) => Err(invalid(&format!(
                "{constraints:?} does not apply to {data_type} properties"
            ))),
        }
    }

    /// Validates a value against the data type and constraints.
    ///
    /// Integer values given to a float property are widened. The returned
    /// value is what should be stored.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first violation.
    pub fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let value = match (self.data_type, value) {
            (DataType::Boolean, v @ Value::Boolean(_))
            | (DataType::Integer, v @ Value::Integer(_))
            | (DataType::String | DataType::Enum, v @ Value::String(_)) => v,
            (DataType::Float, Value::Float(f)) => Value::Float(f),
            #[allow(clippy::cast_precision_loss)]
            (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (data_type, other) => {
                return Err(ValidationError::TypeMismatch {
                    expected: data_type.as_str(),
                    actual: other.type_name(),
                });
            }
        };

        self.check_constraints(&value)?;
        Ok(value)
    }

    fn check_constraints(&self, value: &Value) -> Result<(), ValidationError> {
        if let Value::Float(f) = value
            && !f.is_finite()
        {
            return Err(ValidationError::NotFinite(*f));
        }

        match (&self.constraints, value) {
            (Constraints::IntegerRange { min, max }, Value::Integer(actual))
                if actual < min || actual > max =>
            {
                Err(ValidationError::OutOfRange {
                    min: *min,
                    max: *max,
                    actual: *actual,
                })
            }
            (Constraints::FloatRange { min, max }, Value::Float(actual))
                if actual < min || actual > max =>
            {
                Err(ValidationError::FloatOutOfRange {
                    min: *min,
                    max: *max,
                    actual: *actual,
                })
            }
            (Constraints::Enum(values), Value::String(actual))
                if !values.iter().any(|v| v == actual) =>
            {
                Err(ValidationError::NotInEnum {
                    value: actual.clone(),
                    allowed: values.join(","),
                })
            }
            _ => Ok(()),
        }
    }

    /// Decodes a raw command payload according to the data type.
    ///
    /// Booleans must be exactly `true` or `false`; numbers must parse in
    /// full; enum payloads must be one of the declared values. String
    /// payloads are passed through untouched, including any
    /// comma-separated secondary parameter.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the payload does not decode or the
    /// decoded value breaks the constraints.
    pub fn decode(&self, payload: &str) -> Result<Value, DecodeError> {
        let value = match self.data_type {
            DataType::Boolean => match payload {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                other => return Err(DecodeError::InvalidBoolean(other.to_string())),
            },
            DataType::Integer => payload
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| DecodeError::InvalidInteger(payload.to_string()))?,
            DataType::Float => match payload.parse::<f64>() {
                Ok(f) if f.is_finite() => Value::Float(f),
                _ => return Err(DecodeError::InvalidFloat(payload.to_string())),
            },
            DataType::String | DataType::Enum => Value::String(payload.to_string()),
        };

        self.check_constraints(&value).map_err(|e| match e {
            ValidationError::NotInEnum { value, allowed } => {
                DecodeError::NotInEnum { value, allowed }
            }
            other => DecodeError::OutOfRange(other),
        })?;
        Ok(value)
    }
}
