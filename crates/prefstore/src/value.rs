//! Tagged representation of the six primitive setting types.

use crate::{error::SettingsError, settings::Settings};

/// A single stored value, tagged with its primitive type.
///
/// Equality is structural and bit-exact: two floats are equal only when their stored bits are
/// identical, so `0.0` and `-0.0` differ and a `NaN` equals itself. Values of different kinds
/// are never equal.
#[derive(Debug, Clone)]
pub enum SettingValue {
    /// A 32-bit signed integer.
    Int(i32),
    /// A 64-bit signed integer.
    Long(i64),
    /// A UTF-8 string.
    String(String),
    /// A 32-bit float.
    Float(f32),
    /// A 64-bit float.
    Double(f64),
    /// A boolean.
    Boolean(bool),
}

impl PartialEq for SettingValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SettingValue::Int(a), SettingValue::Int(b)) => a == b,
            (SettingValue::Long(a), SettingValue::Long(b)) => a == b,
            (SettingValue::String(a), SettingValue::String(b)) => a == b,
            (SettingValue::Float(a), SettingValue::Float(b)) => a.to_bits() == b.to_bits(),
            (SettingValue::Double(a), SettingValue::Double(b)) => a.to_bits() == b.to_bits(),
            (SettingValue::Boolean(a), SettingValue::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SettingValue {}

impl SettingValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            SettingValue::Int(_) => ValueKind::Int,
            SettingValue::Long(_) => ValueKind::Long,
            SettingValue::String(_) => ValueKind::String,
            SettingValue::Float(_) => ValueKind::Float,
            SettingValue::Double(_) => ValueKind::Double,
            SettingValue::Boolean(_) => ValueKind::Boolean,
        }
    }

    /// Write this value to `settings` through the matching typed setter.
    pub fn write_to<S: Settings + ?Sized>(
        self,
        settings: &S,
        key: &str,
    ) -> Result<(), SettingsError> {
        match self {
            SettingValue::Int(v) => settings.put_int(key, v),
            SettingValue::Long(v) => settings.put_long(key, v),
            SettingValue::String(v) => settings.put_string(key, &v),
            SettingValue::Float(v) => settings.put_float(key, v),
            SettingValue::Double(v) => settings.put_double(key, v),
            SettingValue::Boolean(v) => settings.put_bool(key, v),
        }
    }
}

/// The primitive type of a setting, without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    #[allow(missing_docs)]
    Int,
    #[allow(missing_docs)]
    Long,
    #[allow(missing_docs)]
    String,
    #[allow(missing_docs)]
    Float,
    #[allow(missing_docs)]
    Double,
    #[allow(missing_docs)]
    Boolean,
}

impl ValueKind {
    /// Read `key` from `settings` with the typed getter matching this kind.
    ///
    /// Absence is reported as `None`, which is how the change cache tells "missing" apart from
    /// "present with the default value".
    pub fn read<S: Settings + ?Sized>(
        self,
        settings: &S,
        key: &str,
    ) -> Result<Option<SettingValue>, SettingsError> {
        Ok(match self {
            ValueKind::Int => settings.get_int_or_null(key)?.map(SettingValue::Int),
            ValueKind::Long => settings.get_long_or_null(key)?.map(SettingValue::Long),
            ValueKind::String => settings.get_string_or_null(key)?.map(SettingValue::String),
            ValueKind::Float => settings.get_float_or_null(key)?.map(SettingValue::Float),
            ValueKind::Double => settings.get_double_or_null(key)?.map(SettingValue::Double),
            ValueKind::Boolean => settings.get_bool_or_null(key)?.map(SettingValue::Boolean),
        })
    }

    /// Stable tag persisted next to each value by the SQLite backend.
    #[cfg(feature = "sqlite")]
    pub(crate) fn code(self) -> i64 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::String => 2,
            ValueKind::Float => 3,
            ValueKind::Double => 4,
            ValueKind::Boolean => 5,
        }
    }

    #[cfg(feature = "sqlite")]
    pub(crate) fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ValueKind::Int,
            1 => ValueKind::Long,
            2 => ValueKind::String,
            3 => ValueKind::Float,
            4 => ValueKind::Double,
            5 => ValueKind::Boolean,
            _ => return None,
        })
    }
}

/// A Rust type that maps onto one of the six primitive setting kinds.
///
/// This trait is sealed; it is implemented for `i32`, `i64`, `String`, `f32`, `f64` and `bool`.
pub trait SettingType: Clone + Send + Sync + 'static + sealed::Sealed {
    /// The kind tag used to store values of this type.
    const KIND: ValueKind;

    /// Wrap a value in its tagged form.
    fn into_value(self) -> SettingValue;

    /// Unwrap a tagged value, returning `None` if the kind does not match.
    fn from_value(value: SettingValue) -> Option<Self>;

    /// Read this type from `settings`, returning `None` when the key is absent.
    fn read<S: Settings + ?Sized>(settings: &S, key: &str) -> Result<Option<Self>, SettingsError>;

    /// Write this type to `settings`.
    fn write<S: Settings + ?Sized>(
        settings: &S,
        key: &str,
        value: Self,
    ) -> Result<(), SettingsError> {
        value.into_value().write_to(settings, key)
    }
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! impl_setting_type {
    ($ty:ty, $variant:ident, $getter:ident) => {
        impl sealed::Sealed for $ty {}

        impl SettingType for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> SettingValue {
                SettingValue::$variant(self)
            }

            fn from_value(value: SettingValue) -> Option<Self> {
                match value {
                    SettingValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn read<S: Settings + ?Sized>(
                settings: &S,
                key: &str,
            ) -> Result<Option<Self>, SettingsError> {
                settings.$getter(key)
            }
        }
    };
}

impl_setting_type!(i32, Int, get_int_or_null);
impl_setting_type!(i64, Long, get_long_or_null);
impl_setting_type!(String, String, get_string_or_null);
impl_setting_type!(f32, Float, get_float_or_null);
impl_setting_type!(f64, Double, get_double_or_null);
impl_setting_type!(bool, Boolean, get_bool_or_null);
