//! Decoded configuration values.
//!
//! The store keeps every value as an opaque string. A decoded [`Value`] is
//! either that string or, for a directory, the ordered values of its children.
//! Scalar coercion is a convenience on top of the string form.

use std::fmt;

use serde::Serialize;

use crate::error::{ConfError, ConfResult};

/// A decoded configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Leaf value, exactly as stored.
    String(String),

    /// Directory contents, in the order returned by the store.
    List(Vec<Value>),
}

impl Value {
    /// Borrow the string form of a leaf value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::List(_) => None,
        }
    }

    /// Borrow the children of a directory value.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::String(_) => None,
            Self::List(items) => Some(items),
        }
    }

    /// Coerce to an integer. Floating point text is truncated toward zero.
    pub fn to_int(&self) -> ConfResult<i64> {
        let s = self.scalar("integer")?;
        if let Ok(v) = s.parse::<i64>() {
            return Ok(v);
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v.trunc() as i64),
            _ => Err(self.conversion("integer")),
        }
    }

    /// Coerce to a float.
    pub fn to_float(&self) -> ConfResult<f64> {
        self.scalar("float")?
            .parse::<f64>()
            .map_err(|_| self.conversion("float"))
    }

    /// Coerce to a bool. Accepts `true`/`false` and numbers (non-zero is true).
    pub fn to_bool(&self) -> ConfResult<bool> {
        let s = self.scalar("bool")?;
        if s.eq_ignore_ascii_case("true") {
            return Ok(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Ok(false);
        }
        s.parse::<f64>()
            .map(|v| v != 0.0)
            .map_err(|_| self.conversion("bool"))
    }

    fn scalar(&self, target: &'static str) -> ConfResult<&str> {
        self.as_str()
            .map(str::trim)
            .ok_or_else(|| self.conversion(target))
    }

    fn conversion(&self, target: &'static str) -> ConfError {
        ConfError::Conversion {
            value: self.to_string(),
            target,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
