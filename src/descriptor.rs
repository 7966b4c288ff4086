//! State descriptors and descriptor distance.
//!
//! A `Descriptor` is the expected (belief) or observed (reality) state of one
//! subsystem. Gap severity is derived from a pluggable `DescriptorDistance`.

use serde::{Deserialize, Serialize};

/// Possible states a subsystem can be described by.
///
/// # Examples
///
/// ```
/// use vantage::Descriptor;
///
/// let flag = Descriptor::Bool(true);
/// let level = Descriptor::from(3);
/// let mode = Descriptor::from("active");
///
/// assert!(flag.is_bool());
/// assert_eq!(level.as_int(), Some(3));
/// assert_eq!(mode.as_text(), Some("active"));
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Descriptor {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Structured(serde_json::Value),
    Null,
}

#[allow(missing_docs)]
impl Descriptor {
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Structured(_) => "structured",
            Self::Null => "null",
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Structured(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Descriptor {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Descriptor {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Descriptor {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Descriptor {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Descriptor {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Descriptor {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<serde_json::Value> for Descriptor {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

/// Distance between an expected and an observed descriptor.
///
/// Implementations must return a value in `[0.0, 1.0]`, be deterministic, and
/// return `0.0` when both sides are equal.
pub trait DescriptorDistance: Send + Sync {
    /// Computes the distance. `None` means the subsystem is absent on that side.
    fn distance(&self, expected: Option<&Descriptor>, observed: Option<&Descriptor>) -> f64;
}

/// Default distance: type-aware structural comparison.
///
/// - presence on one side only, or a type change: `1.0`
/// - numbers: relative difference, scaled by `max(|a|, |b|, 1)`
/// - text: `0.5` plus half the unshared-prefix ratio
/// - JSON objects: share of top-level keys whose values differ
///
/// Unequal descriptors never score `0.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralDistance;

impl DescriptorDistance for StructuralDistance {
    fn distance(&self, expected: Option<&Descriptor>, observed: Option<&Descriptor>) -> f64 {
        let (a, b) = match (expected, observed) {
            (None, None) => return 0.0,
            (Some(a), Some(b)) => (a, b),
            _ => return 1.0,
        };
        if a == b {
            return 0.0;
        }

        let raw = match (a, b) {
            (Descriptor::Bool(_), Descriptor::Bool(_)) => 1.0,
            (Descriptor::Text(x), Descriptor::Text(y)) => text_distance(x, y),
            (Descriptor::Structured(x), Descriptor::Structured(y)) => structured_distance(x, y),
            _ if a.is_numeric() && b.is_numeric() => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => numeric_distance(x, y),
                _ => 1.0,
            },
            _ => 1.0,
        };

        if raw.is_nan() {
            1.0
        } else {
            raw.clamp(f64::EPSILON, 1.0)
        }
    }
}

fn numeric_distance(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() / scale
}

#[allow(clippy::cast_precision_loss)]
fn text_distance(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    let shared = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
    0.5 + 0.5 * (1.0 - shared as f64 / longest as f64)
}

#[allow(clippy::cast_precision_loss)]
fn structured_distance(a: &serde_json::Value, b: &serde_json::Value) -> f64 {
    let (Some(x), Some(y)) = (a.as_object(), b.as_object()) else {
        return 1.0;
    };

    let keys: std::collections::BTreeSet<&String> = x.keys().chain(y.keys()).collect();
    if keys.is_empty() {
        return 0.0;
    }
    let differing = keys.iter().filter(|k| x.get(k.as_str()) != y.get(k.as_str())).count();
    differing as f64 / keys.len() as f64
}
