//! Dynamically typed element values

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// A value carried by an element, typed by the provider at run time
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
}

/// Numeric view used for cross-kind comparison
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i128),
    Float(f64),
}

impl Value {
    /// Name of the value kind, as reported in errors
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::U8(_) => "uint8",
            Value::U16(_) => "uint16",
            Value::U32(_) => "uint32",
            Value::U64(_) => "uint64",
            Value::I8(_) => "sint8",
            Value::I16(_) => "sint16",
            Value::I32(_) => "sint32",
            Value::I64(_) => "sint64",
            Value::F32(_) => "real32",
            Value::F64(_) => "real64",
            Value::String(_) => "string",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String contents, if this is a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) => Some(v.into()),
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::I64(v) => Some(v.into()),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match *self {
            Value::F32(v) => Some(Number::Float(v.into())),
            Value::F64(v) => Some(Number::Float(v)),
            _ => self.as_integer().map(Number::Int),
        }
    }

    /// Numeric reading of a string, for comparisons against numbers
    fn parse_number(&self) -> Option<Number> {
        let text = self.as_str()?.trim();
        text.parse()
            .map(Number::Int)
            .or_else(|_| text.parse().map(Number::Float))
            .ok()
    }

    /// Compare with WQL semantics: numbers across kinds (strings holding
    /// numbers included), strings without case, booleans with booleans.
    /// `None` when the two are incomparable or either side is null.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
            _ => match (
                self.as_number().or_else(|| self.parse_number())?,
                other.as_number().or_else(|| other.parse_number())?,
            ) {
                (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
                #[allow(clippy::cast_precision_loss)]
                (Number::Int(a), Number::Float(b)) => (a as f64).partial_cmp(&b),
                #[allow(clippy::cast_precision_loss)]
                (Number::Float(a), Number::Int(b)) => a.partial_cmp(&(b as f64)),
                (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) if v.is_finite() => write!(f, "{v:?}"),
            Value::F32(v) => write_float(f, f64::from(*v)),
            Value::F64(v) => write_float(f, *v),
            Value::String(v) => {
                f.write_str("'")?;
                for c in v.chars() {
                    if matches!(c, '\\' | '\'') {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("'")
            }
        }
    }
}

/// Float literal that compiles back: always a fraction or exponent.
/// Infinities overflow to themselves when parsed; NaN has no literal and
/// renders as NULL, which compares false the same way.
fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NULL")
    } else if v.is_infinite() {
        f.write_str(if v > 0.0 { "1e309" } else { "-1e309" })
    } else {
        write!(f, "{v:?}")
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
        }
    }
}

/// Plain JSON maps onto the widest value of each family: non-negative
/// integers become `U64`, negative ones `I64`, other numbers `F64`.
impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(v) => Ok(Value::Bool(v)),
            serde_json::Value::String(v) => Ok(Value::String(v)),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Ok(Value::U64(v))
                } else if let Some(v) = n.as_i64() {
                    Ok(Value::I64(v))
                } else {
                    n.as_f64()
                        .map(Value::F64)
                        .ok_or_else(|| format!("unrepresentable number {n}"))
                }
            }
            other => Err(format!("unsupported element value: {other}")),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    f32 => F32, f64 => F64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_across_integer_kinds() {
        assert_eq!(Value::U8(4).compare(&Value::I64(4)), Some(Ordering::Equal));
        assert_eq!(Value::I32(-1).compare(&Value::U64(0)), Some(Ordering::Less));
        assert_eq!(Value::F64(2.5).compare(&Value::U32(2)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_strings_ignores_case() {
        let a = Value::from("System");
        assert_eq!(a.compare(&Value::from("SYSTEM")), Some(Ordering::Equal));
        assert_eq!(a.compare(&Value::U8(1)), None);
        assert_eq!(Value::from("4").compare(&Value::U64(4)), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_from_json() {
        let json: serde_json::Value =
            serde_json::json!({"a": 7, "b": -3, "c": 1.5, "d": "x", "e": null, "f": true});
        let map = json.as_object().unwrap();
        assert_eq!(Value::try_from(map["a"].clone()).unwrap(), Value::U64(7));
        assert_eq!(Value::try_from(map["b"].clone()).unwrap(), Value::I64(-3));
        assert_eq!(Value::try_from(map["c"].clone()).unwrap(), Value::F64(1.5));
        assert_eq!(Value::try_from(map["d"].clone()).unwrap(), Value::from("x"));
        assert_eq!(Value::try_from(map["e"].clone()).unwrap(), Value::Null);
        assert_eq!(Value::try_from(map["f"].clone()).unwrap(), Value::Bool(true));
        assert!(Value::try_from(serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn test_display_escapes_strings() {
        assert_eq!(Value::from("it's").to_string(), r"'it\'s'");
        assert_eq!(Value::from(r"C:\Windows").to_string(), r"'C:\\Windows'");
        assert_eq!(Value::Bool(false).to_string(), "FALSE");
    }

    #[test]
    fn test_display_floats() {
        assert_eq!(Value::F64(1.5).to_string(), "1.5");
        assert_eq!(Value::F64(2.0).to_string(), "2.0");
        assert_eq!(Value::F64(1e21).to_string(), "1e21");
        assert_eq!(Value::F32(0.1).to_string(), "0.1");
        assert_eq!(Value::F64(f64::INFINITY).to_string(), "1e309");
        assert_eq!(Value::F64(f64::NEG_INFINITY).to_string(), "-1e309");
        assert_eq!(Value::F64(f64::NAN).to_string(), "NULL");
    }
}
