//! The tagged value union carried by symbol-table entries.
//!
//! The source this toolkit is modeled on type-switches on `interface{}`
//! at runtime; here that collapses into an explicit sum type whose
//! discriminant matches the wire `type` field used by the section codec
//! (see `section::SymbolType`).

use num::BigRational;
use std::fmt;

/// A symbol's payload. `Integer` and `Number` are distinct for the
/// purposes of arithmetic type-checking (§4.3: "types must agree") even
/// though both ultimately print as numbers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A machine integer, wrapping on overflow.
    Integer(i64),
    /// An arbitrary-precision rational.
    Number(BigRational),
    /// A code offset, used by `Const`-section label symbols referenced
    /// by `JSR`, and by `OS`-section host-call descriptors.
    Label(u64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::Label(_) => "label",
        }
    }

    /// True if `self` and `other` are operands of the same arithmetic
    /// type (both integer or both rational). Labels never participate
    /// in arithmetic.
    pub fn same_arithmetic_type(&self, other: &Value) -> bool {
        matches!(
            (self, other),
            (Value::Integer(_), Value::Integer(_)) | (Value::Number(_), Value::Number(_))
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Number(r) => write!(f, "{}", r),
            Value::Label(addr) => write!(f, "{}", addr),
        }
    }
}
