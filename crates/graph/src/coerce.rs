//! Textual property values to element-native typed values.
//!
//! Coercion is pure: it never touches an element. Applying the result is a
//! separate step (see [`crate::pipeline::apply_properties`]).

use std::num::IntErrorKind;
use std::str::FromStr;

use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use thiserror::Error;

/// Property type categories the coercer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    I8,
    U8,
    I32,
    U32,
    I64,
    U64,
    Bool,
    F32,
    F64,
    String,
    Caps,
    Enum,
    Flags,
    Other,
}

/// A coerced value, ready to be turned into a `glib::Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    I8(i8),
    U8(u8),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bool(bool),
    F32(f32),
    F64(f64),
    String(String),
    Caps(gst::Caps),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("properties of type {type_name} are not supported")]
    UnsupportedType { type_name: String },

    #[error("'{value}' is not a valid {expected}")]
    InvalidFormat {
        value: String,
        expected: &'static str,
    },

    #[error("{value} is out of range for {expected}")]
    OutOfRange {
        value: String,
        expected: &'static str,
    },
}

impl PropertyKind {
    pub fn from_type(ty: glib::Type) -> Self {
        const SCALARS: [(glib::Type, PropertyKind); 10] = [
            (glib::Type::I8, PropertyKind::I8),
            (glib::Type::U8, PropertyKind::U8),
            (glib::Type::I32, PropertyKind::I32),
            (glib::Type::U32, PropertyKind::U32),
            (glib::Type::I64, PropertyKind::I64),
            (glib::Type::U64, PropertyKind::U64),
            (glib::Type::BOOL, PropertyKind::Bool),
            (glib::Type::F32, PropertyKind::F32),
            (glib::Type::F64, PropertyKind::F64),
            (glib::Type::STRING, PropertyKind::String),
        ];
        if let Some((_, kind)) = SCALARS.iter().find(|(scalar, _)| *scalar == ty) {
            return *kind;
        }
        if ty == gst::Caps::static_type() {
            Self::Caps
        } else if ty.is_a(glib::Type::ENUM) {
            Self::Enum
        } else if ty.is_a(glib::Type::FLAGS) {
            Self::Flags
        } else {
            Self::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::Bool => "boolean",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::String => "string",
            Self::Caps => "caps",
            Self::Enum => "enum",
            Self::Flags => "flags",
            Self::Other => "unknown",
        }
    }
}

impl PropertyValue {
    pub fn to_value(&self) -> glib::Value {
        match self {
            Self::I8(v) => v.to_value(),
            Self::U8(v) => v.to_value(),
            Self::I32(v) => v.to_value(),
            Self::U32(v) => v.to_value(),
            Self::I64(v) => v.to_value(),
            Self::U64(v) => v.to_value(),
            Self::Bool(v) => v.to_value(),
            Self::F32(v) => v.to_value(),
            Self::F64(v) => v.to_value(),
            Self::String(v) => v.to_value(),
            Self::Caps(v) => v.to_value(),
        }
    }

    /// Numeric view used for range checks against a param spec.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I8(v) => Some(f64::from(*v)),
            Self::U8(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::I64(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            Self::Bool(_) | Self::String(_) | Self::Caps(_) => None,
        }
    }
}

fn int<T>(value: &str, expected: &'static str) -> Result<T, CoercionError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    value.trim().parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => CoercionError::OutOfRange {
            value: value.to_string(),
            expected,
        },
        _ => CoercionError::InvalidFormat {
            value: value.to_string(),
            expected,
        },
    })
}

fn float(value: &str, expected: &'static str) -> Result<f64, CoercionError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| CoercionError::InvalidFormat {
            value: value.to_string(),
            expected,
        })
}

/// Convert `value` to the given property kind.
///
/// Caps parsing needs an initialized GStreamer.
pub fn coerce(kind: PropertyKind, value: &str) -> Result<PropertyValue, CoercionError> {
    let expected = kind.name();
    match kind {
        PropertyKind::I8 => int(value, expected).map(PropertyValue::I8),
        PropertyKind::U8 => int(value, expected).map(PropertyValue::U8),
        PropertyKind::I32 => int(value, expected).map(PropertyValue::I32),
        PropertyKind::U32 => int(value, expected).map(PropertyValue::U32),
        PropertyKind::I64 => int(value, expected).map(PropertyValue::I64),
        PropertyKind::U64 => int(value, expected).map(PropertyValue::U64),
        PropertyKind::Bool => match value {
            "true" => Ok(PropertyValue::Bool(true)),
            "false" => Ok(PropertyValue::Bool(false)),
            _ => Err(CoercionError::InvalidFormat {
                value: value.to_string(),
                expected,
            }),
        },
        PropertyKind::F32 => {
            let parsed = float(value, expected)?;
            if parsed.is_finite() && parsed.abs() > f64::from(f32::MAX) {
                return Err(CoercionError::OutOfRange {
                    value: value.to_string(),
                    expected,
                });
            }
            Ok(PropertyValue::F32(parsed as f32))
        }
        PropertyKind::F64 => float(value, expected).map(PropertyValue::F64),
        PropertyKind::String => Ok(PropertyValue::String(value.to_string())),
        PropertyKind::Caps => gst::Caps::from_str(value)
            .map(PropertyValue::Caps)
            .map_err(|_| CoercionError::InvalidFormat {
                value: value.to_string(),
                expected,
            }),
        PropertyKind::Enum | PropertyKind::Flags | PropertyKind::Other => {
            Err(CoercionError::UnsupportedType {
                type_name: expected.to_string(),
            })
        }
    }
}

/// Coerce a value for a property of the given GLib type.
pub fn coerce_for_type(ty: glib::Type, value: &str) -> Result<PropertyValue, CoercionError> {
    let kind = PropertyKind::from_type(ty);
    coerce(kind, value).map_err(|e| match e {
        CoercionError::UnsupportedType { .. } => CoercionError::UnsupportedType {
            type_name: ty.name().to_string(),
        },
        other => other,
    })
}
