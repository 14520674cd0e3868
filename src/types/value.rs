use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Dynamic value exchanged between rules through the evaluation context.
///
/// Every native number form widens into [`Value::Number`] via the `From`
/// conversions, so a rule reading a value never has to care whether the
/// writer used an `i32` or an `f64`.
#[derive(Clone, Default)]
pub enum Value {
    /// A 64-bit floating-point number. All numeric inputs widen to this.
    Number(f64),
    /// A UTF-8 string.
    String(String),
    /// A boolean value.
    Bool(bool),
    /// The absence of a value.
    #[default]
    Null,
    /// A host-defined payload carried through the context untouched.
    /// Compared by pointer identity.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap an arbitrary host value as an opaque payload.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    /// The name of this value's shape, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Coerce to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for non-numeric values.
    pub fn as_f64(&self) -> Result<f64, Error> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Error::TypeMismatch {
                expected: "number",
                actual: other.type_name(),
            }),
        }
    }

    /// Coerce to `i64`, truncating any fractional part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for non-numeric values.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Result<i64, Error> {
        self.as_f64().map(|n| n as i64)
    }

    /// Borrow the string payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for non-string values.
    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(Error::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    /// Read the boolean payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for non-bool values.
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::TypeMismatch {
                expected: "bool",
                actual: other.type_name(),
            }),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Downcast an opaque payload to a concrete type.
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Opaque(payload) => payload.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! value_from_number {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn from(v: $ty) -> Self {
                    Value::Number(v as f64)
                }
            }
        )+
    };
}

value_from_number!(f32, i8, i16, i32, i64, u8, u16, u32, u64);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        value.as_f64()
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        value.as_i64()
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        value.as_bool()
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(Error::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => f.debug_tuple("Number").field(v).finish(),
            Value::String(v) => f.debug_tuple("String").field(v).finish(),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Null => f.write_str("Null"),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Null => write!(f, "null"),
            Value::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}
