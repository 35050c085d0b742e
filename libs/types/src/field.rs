//! Typed message fields
//!
//! A [`Field`] is a named, typed value. Header fields carry routing and
//! identity data (mission, component, message type); everything else is
//! body content.

use crate::{TypesError, TypesResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The value type of a field, without the value itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    Boolean,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Binary,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::I8 => "I8",
            FieldKind::U8 => "U8",
            FieldKind::I16 => "I16",
            FieldKind::U16 => "U16",
            FieldKind::I32 => "I32",
            FieldKind::U32 => "U32",
            FieldKind::I64 => "I64",
            FieldKind::U64 => "U64",
            FieldKind::F32 => "F32",
            FieldKind::F64 => "F64",
            FieldKind::String => "STRING",
            FieldKind::Binary => "BINARY",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::I8
                | FieldKind::U8
                | FieldKind::I16
                | FieldKind::U16
                | FieldKind::I32
                | FieldKind::U32
                | FieldKind::I64
                | FieldKind::U64
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum FieldValue {
    Boolean(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::I8(_) => FieldKind::I8,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::I16(_) => FieldKind::I16,
            FieldValue::U16(_) => FieldKind::U16,
            FieldValue::I32(_) => FieldKind::I32,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::I64(_) => FieldKind::I64,
            FieldValue::U64(_) => FieldKind::U64,
            FieldValue::F32(_) => FieldKind::F32,
            FieldValue::F64(_) => FieldKind::F64,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Binary(_) => FieldKind::Binary,
        }
    }

    /// Integer view of the value.
    ///
    /// Floats truncate toward zero, strings are parsed, booleans map to 0/1.
    /// Returns None for binary data, unparseable strings, non-finite floats
    /// and `U64` values above `i64::MAX`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Boolean(v) => Some(i64::from(*v)),
            FieldValue::I8(v) => Some(i64::from(*v)),
            FieldValue::U8(v) => Some(i64::from(*v)),
            FieldValue::I16(v) => Some(i64::from(*v)),
            FieldValue::U16(v) => Some(i64::from(*v)),
            FieldValue::I32(v) => Some(i64::from(*v)),
            FieldValue::U32(v) => Some(i64::from(*v)),
            FieldValue::I64(v) => Some(*v),
            FieldValue::U64(v) => i64::try_from(*v).ok(),
            FieldValue::F32(v) => float_to_i64(f64::from(*v)),
            FieldValue::F64(v) => float_to_i64(*v),
            FieldValue::String(s) => s.trim().parse().ok(),
            FieldValue::Binary(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::F32(v) => Some(f64::from(*v)),
            FieldValue::F64(v) => Some(*v),
            FieldValue::U64(v) => Some(*v as f64),
            FieldValue::String(s) => s.trim().parse().ok(),
            FieldValue::Binary(_) => None,
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

fn float_to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::I8(v) => write!(f, "{v}"),
            FieldValue::U8(v) => write!(f, "{v}"),
            FieldValue::I16(v) => write!(f, "{v}"),
            FieldValue::U16(v) => write!(f, "{v}"),
            FieldValue::I32(v) => write!(f, "{v}"),
            FieldValue::U32(v) => write!(f, "{v}"),
            FieldValue::I64(v) => write!(f, "{v}"),
            FieldValue::U64(v) => write!(f, "{v}"),
            FieldValue::F32(v) => write!(f, "{v}"),
            FieldValue::F64(v) => write!(f, "{v}"),
            FieldValue::String(v) => f.write_str(v),
            FieldValue::Binary(v) => f.write_str(&hex::encode(v)),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Boolean,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Binary,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// A named, typed message field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawField")]
pub struct Field {
    name: String,
    value: FieldValue,
    #[serde(default)]
    header: bool,
}

/// Wire shape of a field before its name is checked
#[derive(Deserialize)]
struct RawField {
    name: String,
    value: FieldValue,
    #[serde(default)]
    header: bool,
}

impl TryFrom<RawField> for Field {
    type Error = TypesError;

    fn try_from(raw: RawField) -> TypesResult<Self> {
        Ok(Self::new(raw.name, raw.value)?.with_header(raw.header))
    }
}

impl Field {
    /// Create a body field. The name must not be empty.
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> TypesResult<Self> {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(TypesError::EmptyFieldName);
        }
        Ok(Self {
            name: name.to_string(),
            value: value.into(),
            header: false,
        })
    }

    /// Create a header field
    pub fn header(name: impl Into<String>, value: impl Into<FieldValue>) -> TypesResult<Self> {
        Ok(Self::new(name, value)?.with_header(true))
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn kind(&self) -> FieldKind {
        self.value.kind()
    }

    pub fn is_header(&self) -> bool {
        self.header
    }

    pub fn set_value(&mut self, value: impl Into<FieldValue>) {
        self.value = value.into();
    }

    pub fn into_value(self) -> FieldValue {
        self.value
    }

    pub fn string_value(&self) -> String {
        self.value.to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})={}", self.name, self.value.kind(), self.value)
    }
}
