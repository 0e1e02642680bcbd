//! Runtime value domain for condition expressions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

/// Process-wide default epsilon for numeric equality, stored as f64 bits.
/// Initial value is 1e-6 (bit pattern 0x3EB0C6F7A0B5ED8D).
static DEFAULT_EPSILON_BITS: AtomicU64 = AtomicU64::new(0x3EB0_C6F7_A0B5_ED8D);

/// Returns the process-wide default epsilon used for numeric equality.
pub fn default_epsilon() -> f64 {
    f64::from_bits(DEFAULT_EPSILON_BITS.load(Ordering::Relaxed))
}

/// Sets the process-wide default epsilon.
///
/// This is an admin/test affordance, not per-request state. Concurrent
/// readers may observe the old or new value; each evaluation reads the
/// epsilon once at entry.
pub fn set_default_epsilon(epsilon: f64) {
    DEFAULT_EPSILON_BITS.store(epsilon.to_bits(), Ordering::Relaxed);
}

/// Near-equality for f64 under the given epsilon.
///
/// Exact matches are equal. A zero operand is never equal to a nonzero one.
/// Otherwise the relative difference `|a-b| / min(|a|+|b|, MAX)` is compared
/// strictly against epsilon.
pub fn float_equal(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    let smallest_nonzero = f64::from_bits(1);
    if a == 0.0 || b == 0.0 || diff < smallest_nonzero {
        return diff < epsilon * smallest_nonzero;
    }
    diff / (a.abs() + b.abs()).min(f64::MAX) < epsilon
}

/// A homogeneous array of scalar values.
///
/// Arrays carry their element type so membership checks can reject
/// cross-type probes instead of silently answering false.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    Number(Vec<f64>),
    String(Vec<String>),
}

impl ArrayValue {
    /// Name of the element type, for error messages.
    pub fn element_kind(&self) -> &'static str {
        match self {
            ArrayValue::Bool(_) => "bool",
            ArrayValue::Number(_) => "number",
            ArrayValue::String(_) => "string",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::Number(v) => v.len(),
            ArrayValue::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test against a scalar of the matching element type.
    ///
    /// Returns `None` when the scalar's type does not match the element
    /// type; numbers compare with the given epsilon.
    pub fn contains(&self, value: &Value, epsilon: f64) -> Option<bool> {
        match (self, value) {
            (ArrayValue::Bool(items), Value::Bool(b)) => Some(items.contains(b)),
            (ArrayValue::Number(items), Value::Number(n)) => {
                Some(items.iter().any(|item| float_equal(*item, *n, epsilon)))
            },
            (ArrayValue::String(items), Value::String(s)) => {
                Some(items.iter().any(|item| item == s))
            },
            _ => None,
        }
    }
}

/// A runtime value produced by evaluating an expression node.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayValue),
    Regex(Regex),
}

impl Value {
    /// Name of the value's type, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Regex(_) => "regex",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(ArrayValue::Bool(items)) => write_array(f, items),
            Value::Array(ArrayValue::Number(items)) => write_array(f, items),
            Value::Array(ArrayValue::String(items)) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", item)?;
                }
                write!(f, "]")
            },
            Value::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

fn write_array<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equal_table() {
        let epsilon = 1e-6;
        assert!(float_equal(0.01, 0.01, epsilon));
        assert!(float_equal(0.01, 0.01000001, epsilon));
        assert!(!float_equal(0.01, 0.0100001, epsilon));
        assert!(!float_equal(0.0, 0.0000001, epsilon));
        assert!(!float_equal(0.0, 0.0000000000000000001, epsilon));
    }

    #[test]
    fn test_float_equal_cross_width_promotion() {
        // f32-originated values compare equal after widening.
        let epsilon = 1e-6;
        assert!(float_equal(0.29, (29.0f32 / 100.0) as f64, epsilon));
        assert!(float_equal(3.0, (1.0f32 + 2.0) as f64, epsilon));
    }

    #[test]
    fn test_array_contains_epsilon() {
        let array = ArrayValue::Number(vec![2.0, 3.0, 4.0]);
        assert_eq!(array.contains(&Value::Number(3.0000001), 1e-6), Some(true));
        assert_eq!(array.contains(&Value::Number(5.0), 1e-6), Some(false));
        assert_eq!(array.contains(&Value::String("3".into()), 1e-6), None);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::Bool(true).kind(), "bool");
        assert_eq!(Value::Number(1.0).kind(), "number");
        assert_eq!(Value::String("x".into()).kind(), "string");
        assert_eq!(Value::Array(ArrayValue::Number(vec![])).kind(), "array");
    }
}
