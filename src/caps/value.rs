//! Field values of a capability structure
//!
//! A field is either a fixed scalar (`Int`, `Fraction`, `Bool`, `Str`) or a set
//! of acceptable scalars (`IntRange`, `FractionRange`, `List`). Intersection of
//! two values yields the subset accepted by both, or `None` when they share
//! nothing.

use std::cmp::Ordering;
use std::fmt;

/// A rational number, always stored reduced with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    num: i32,
    den: i32,
}

impl Fraction {
    /// Create a fraction, reducing it to lowest terms
    ///
    /// A zero denominator is clamped to 1.
    pub fn new(num: i32, den: i32) -> Self {
        let (mut num, mut den) = (num as i64, den as i64);
        if den == 0 {
            den = 1;
        }
        if den < 0 {
            num = -num;
            den = -den;
        }
        let g = gcd(num.abs(), den).max(1);
        Self {
            num: (num / g) as i32,
            den: (den / g) as i32,
        }
    }

    /// Numerator
    pub fn numer(&self) -> i32 {
        self.num
    }

    /// Denominator
    pub fn denom(&self) -> i32 {
        self.den
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i64 * other.den as i64).cmp(&(other.num as i64 * self.den as i64))
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A structure field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Fixed integer
    Int(i64),
    /// Inclusive integer range
    IntRange { min: i64, max: i64 },
    /// Fixed fraction (e.g. a framerate)
    Fraction(Fraction),
    /// Inclusive fraction range
    FractionRange { min: Fraction, max: Fraction },
    /// Fixed boolean
    Bool(bool),
    /// Fixed string (e.g. a pixel format)
    Str(String),
    /// Any one of the listed values
    List(Vec<Value>),
}

impl Value {
    /// Create a string value
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Create an integer range, collapsing a single-point range to `Int`
    pub fn int_range(min: i64, max: i64) -> Self {
        if min == max {
            Value::Int(min)
        } else {
            Value::IntRange {
                min: min.min(max),
                max: min.max(max),
            }
        }
    }

    /// Create a fraction value
    pub fn fraction(num: i32, den: i32) -> Self {
        Value::Fraction(Fraction::new(num, den))
    }

    /// Create a fraction range, collapsing a single-point range to `Fraction`
    pub fn fraction_range(min: Fraction, max: Fraction) -> Self {
        match min.cmp(&max) {
            Ordering::Equal => Value::Fraction(min),
            Ordering::Less => Value::FractionRange { min, max },
            Ordering::Greater => Value::FractionRange { min: max, max: min },
        }
    }

    /// Whether this value denotes exactly one scalar
    pub fn is_fixed(&self) -> bool {
        match self {
            Value::Int(_) | Value::Fraction(_) | Value::Bool(_) | Value::Str(_) => true,
            Value::List(items) => items.len() == 1 && items[0].is_fixed(),
            Value::IntRange { .. } | Value::FractionRange { .. } => false,
        }
    }

    /// Compute the values accepted by both `self` and `other`
    pub fn intersect(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::List(items), other) | (other, Value::List(items)) => {
                intersect_list(items, other)
            }
            (Value::Int(a), Value::Int(b)) => (a == b).then_some(Value::Int(*a)),
            (Value::Int(v), Value::IntRange { min, max })
            | (Value::IntRange { min, max }, Value::Int(v)) => {
                (min <= v && v <= max).then_some(Value::Int(*v))
            }
            (
                Value::IntRange { min: a_min, max: a_max },
                Value::IntRange { min: b_min, max: b_max },
            ) => {
                let lo = *a_min.max(b_min);
                let hi = *a_max.min(b_max);
                (lo <= hi).then(|| Value::int_range(lo, hi))
            }
            (Value::Fraction(a), Value::Fraction(b)) => (a == b).then_some(Value::Fraction(*a)),
            (Value::Fraction(v), Value::FractionRange { min, max })
            | (Value::FractionRange { min, max }, Value::Fraction(v)) => {
                (min <= v && v <= max).then_some(Value::Fraction(*v))
            }
            (
                Value::FractionRange { min: a_min, max: a_max },
                Value::FractionRange { min: b_min, max: b_max },
            ) => {
                let lo = *a_min.max(b_min);
                let hi = *a_max.min(b_max);
                (lo <= hi).then(|| Value::fraction_range(lo, hi))
            }
            (Value::Bool(a), Value::Bool(b)) => (a == b).then_some(Value::Bool(*a)),
            (Value::Str(a), Value::Str(b)) => (a == b).then(|| Value::Str(a.clone())),
            _ => None,
        }
    }

    /// Whether `self` and `other` share at least one value
    pub fn can_intersect(&self, other: &Value) -> bool {
        self.intersect(other).is_some()
    }
}

fn intersect_list(items: &[Value], other: &Value) -> Option<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if let Some(v) = item.intersect(other) {
            // Flatten nested lists produced by list-vs-list intersection
            let parts = match v {
                Value::List(inner) => inner,
                single => vec![single],
            };
            for part in parts {
                if !out.contains(&part) {
                    out.push(part);
                }
            }
        }
    }

    match out.len() {
        0 => None,
        1 => out.pop(),
        _ => Some(Value::List(out)),
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Fraction> for Value {
    fn from(v: Fraction) -> Self {
        Value::Fraction(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::IntRange { min, max } => write!(f, "[{},{}]", min, max),
            Value::Fraction(v) => write!(f, "{}", v),
            Value::FractionRange { min, max } => write!(f, "[{},{}]", min, max),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => {
                let bare = !s.is_empty()
                    && s
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
                    && s != "true"
                    && s != "false"
                    && s.parse::<i64>().is_err();
                if bare {
                    write!(f, "{}", s)
                } else {
                    write!(f, "\"{}\"", s.replace('"', "\\\""))
                }
            }
            Value::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}
