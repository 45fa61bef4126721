//! Typed destination records
//!
//! A record type declares, once, which provider element each of its fields
//! binds to. The binding table is built on first use and cached for the
//! life of the process; decoding walks it in field order.
//!
//! Records are declared with [`mi_record!`](crate::mi_record):
//!
//! ```ignore
//! hostmetrics_mi::mi_record! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct Win32Process {
//!         pub name: String => "Name",
//!         pub handle: Option<String> => "Handle",
//!     }
//! }
//! ```

use crate::error::MiError;
use crate::unmarshal::ElementSource;
use crate::value::Value;

/// Binding of one record field to one provider element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBinding {
    field: &'static str,
    element: &'static str,
}

impl FieldBinding {
    #[must_use]
    pub const fn new(field: &'static str, element: &'static str) -> Self {
        Self { field, element }
    }

    #[must_use]
    pub fn field(&self) -> &'static str {
        self.field
    }

    #[must_use]
    pub fn element(&self) -> &'static str {
        self.element
    }
}

/// Binding table for a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    record: &'static str,
    fields: Vec<FieldBinding>,
}

impl Schema {
    #[must_use]
    pub fn new(record: &'static str, fields: Vec<FieldBinding>) -> Self {
        Self { record, fields }
    }

    #[must_use]
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldBinding] {
        &self.fields
    }

    /// Element names in field order, suitable for a query projection
    #[must_use]
    pub fn element_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(FieldBinding::element).collect()
    }
}

/// A statically typed destination for one instance
pub trait Record: Sized {
    /// Cached binding table
    fn schema() -> &'static Schema;

    /// Decode one instance. Fails on the first missing element or
    /// coercion error.
    ///
    /// # Errors
    /// Returns [`MiError::ElementNotFound`], [`MiError::TypeMismatch`] or
    /// [`MiError::Overflow`].
    fn decode(source: &dyn ElementSource) -> Result<Self, MiError>;
}

/// Reads fields from a source in binding-table order
pub struct FieldReader<'a> {
    bindings: std::slice::Iter<'static, FieldBinding>,
    source: &'a dyn ElementSource,
}

impl<'a> FieldReader<'a> {
    #[must_use]
    pub fn new(schema: &'static Schema, source: &'a dyn ElementSource) -> Self {
        Self {
            bindings: schema.fields.iter(),
            source,
        }
    }

    /// Decode the next bound field
    ///
    /// # Errors
    /// Returns an error if the element is missing or cannot be coerced.
    pub fn read<T: FromValue>(&mut self) -> Result<T, MiError> {
        let binding = self.bindings.next().ok_or_else(|| {
            MiError::ProtocolMisuse("record read past its binding table".to_string())
        })?;
        let value = self.source.element(binding.element)?;
        T::from_value(value, binding.field)
    }
}

/// Coercion from a dynamic value into a field's static type
pub trait FromValue: Sized {
    /// Static type name, as reported in errors
    const TYPE_NAME: &'static str;

    /// # Errors
    /// Returns [`MiError::TypeMismatch`] when the kinds differ and
    /// [`MiError::Overflow`] when the value does not fit.
    fn from_value(value: &Value, field: &str) -> Result<Self, MiError>;
}

fn mismatch(field: &str, expected: &'static str, value: &Value) -> MiError {
    MiError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: value.kind_name(),
    }
}

fn overflow(field: &str, target: &'static str, value: &Value) -> MiError {
    MiError::Overflow {
        field: field.to_string(),
        target,
        value: value.to_string(),
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
                    let integer = value
                        .as_integer()
                        .ok_or_else(|| mismatch(field, Self::TYPE_NAME, value))?;
                    <$ty>::try_from(integer).map_err(|_| overflow(field, Self::TYPE_NAME, value))
                }
            }
        )*
    };
}

impl_from_value_int!(u8, u16, u32, u64, i8, i16, i32, i64);

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
impl FromValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
        match *value {
            Value::F64(v) => Ok(v),
            Value::F32(v) => Ok(v.into()),
            _ => {
                let integer = value
                    .as_integer()
                    .ok_or_else(|| mismatch(field, Self::TYPE_NAME, value))?;
                let float = integer as f64;
                if float as i128 == integer {
                    Ok(float)
                } else {
                    Err(overflow(field, Self::TYPE_NAME, value))
                }
            }
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
impl FromValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
        match *value {
            Value::F32(v) => Ok(v),
            Value::F64(v) => {
                let narrowed = v as f32;
                if f64::from(narrowed) == v || v.is_nan() {
                    Ok(narrowed)
                } else {
                    Err(overflow(field, Self::TYPE_NAME, value))
                }
            }
            _ => {
                let integer = value
                    .as_integer()
                    .ok_or_else(|| mismatch(field, Self::TYPE_NAME, value))?;
                let float = integer as f32;
                if float as i128 == integer {
                    Ok(float)
                } else {
                    Err(overflow(field, Self::TYPE_NAME, value))
                }
            }
        }
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => Err(mismatch(field, Self::TYPE_NAME, value)),
        }
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
        match value {
            Value::String(v) => Ok(v.clone()),
            _ => Err(mismatch(field, Self::TYPE_NAME, value)),
        }
    }
}

/// Null decodes to `None`; the element itself must still be present.
impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value, field: &str) -> Result<Self, MiError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value, field).map(Some)
        }
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "Value";

    fn from_value(value: &Value, _field: &str) -> Result<Self, MiError> {
        Ok(value.clone())
    }
}

/// Declare a record struct together with its element bindings
///
/// Each field is written `name: Type => "ElementName"`. The generated type
/// implements [`Record`].
#[macro_export]
macro_rules! mi_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty => $element:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::record::Record for $name {
            fn schema() -> &'static $crate::record::Schema {
                static SCHEMA: ::std::sync::OnceLock<$crate::record::Schema> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    $crate::record::Schema::new(
                        stringify!($name),
                        vec![$($crate::record::FieldBinding::new(stringify!($field), $element)),*],
                    )
                })
            }

            fn decode(
                source: &dyn $crate::unmarshal::ElementSource,
            ) -> ::std::result::Result<Self, $crate::error::MiError> {
                let mut fields = $crate::record::FieldReader::new(Self::schema(), source);
                Ok(Self {
                    $($field: fields.read::<$ty>()?,)*
                })
            }
        }
    };
}
