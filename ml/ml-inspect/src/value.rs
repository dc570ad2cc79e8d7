//! Typed field values.
//!
//! Samples arrive as loosely-typed JSON. Each field is normalized into a
//! [`FieldValue`] so that kind and shape changes between samples can be
//! detected instead of silently coerced.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InspectError, Result};

/// Element class of a numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// Integer elements.
    Int,
    /// Floating-point elements.
    Float,
}

impl DType {
    /// Returns the widest of two element classes.
    #[must_use]
    pub const fn widen(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int, Self::Int) => Self::Int,
            _ => Self::Float,
        }
    }
}

/// A single scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    /// Integer number.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Text.
    Text(String),
}

/// A dense numeric array with a fixed shape.
///
/// Elements are stored row-major as `f64` regardless of [`DType`]; integer
/// inputs are promoted on construction.
///
/// # Example
///
/// ```
/// use ml_inspect::{DType, NumericArray};
///
/// let array = NumericArray::new(vec![2, 2], DType::Float, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(array.shape(), &[2, 2]);
/// assert_eq!(array.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericArray {
    shape: Vec<usize>,
    dtype: DType,
    values: Vec<f64>,
}

impl NumericArray {
    /// Creates a new array.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is empty, contains a zero dimension, or
    /// does not match the number of values.
    pub fn new(shape: Vec<usize>, dtype: DType, values: Vec<f64>) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(InspectError::invalid_value(
                "<array>",
                format!("shape {shape:?} must be non-empty with positive dimensions"),
            ));
        }
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(InspectError::invalid_value(
                "<array>",
                format!("shape {shape:?} expects {expected} values, got {}", values.len()),
            ));
        }
        Ok(Self {
            shape,
            dtype,
            values,
        })
    }

    /// Returns the shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element class.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the elements in row-major order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Kind of a field value, as recorded in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Integer scalar.
    Int,
    /// Floating-point scalar.
    Float,
    /// Text scalar.
    Text,
    /// Integer array.
    IntArray,
    /// Floating-point array.
    FloatArray,
    /// Anything else.
    Opaque,
}

impl ValueKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::IntArray => "int_array",
            Self::FloatArray => "float_array",
            Self::Opaque => "opaque",
        }
    }

    /// Returns `true` for kinds that take part in statistics.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int | Self::Float | Self::IntArray | Self::FloatArray
        )
    }

    /// Merges two observations of the same field.
    ///
    /// Integer and float observations widen to float. Returns `None` when
    /// the kinds are incompatible.
    #[must_use]
    pub fn merge(self, other: Self) -> Option<Self> {
        if self == other {
            return Some(self);
        }
        match (self, other) {
            (Self::Int | Self::Float, Self::Int | Self::Float) => Some(Self::Float),
            (Self::IntArray | Self::FloatArray, Self::IntArray | Self::FloatArray) => {
                Some(Self::FloatArray)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A typed sample field.
///
/// # Example
///
/// ```
/// use ml_inspect::{FieldValue, ValueKind};
/// use serde_json::json;
///
/// let value = FieldValue::from_json(&json!([[1, 2], [3, 4]]));
/// assert_eq!(value.kind(), ValueKind::IntArray);
/// assert_eq!(value.shape(), Some(&[2, 2][..]));
///
/// let path = FieldValue::from_json(&json!({"path": "frame_000.png"}));
/// assert_eq!(path.kind(), ValueKind::Opaque);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Scalar number or text.
    Scalar(Scalar),
    /// Fixed-shape numeric array.
    Array(NumericArray),
    /// Value with no numeric interpretation, described briefly.
    Opaque(String),
}

impl FieldValue {
    /// Creates a one-dimensional float array.
    ///
    /// An empty slice has no positive shape and becomes opaque.
    #[must_use]
    pub fn vector(values: &[f64]) -> Self {
        NumericArray::new(vec![values.len()], DType::Float, values.to_vec())
            .map_or_else(|_| Self::Opaque("empty array".to_string()), Self::Array)
    }

    /// Creates a floating-point scalar.
    #[must_use]
    pub const fn float(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }

    /// Creates an integer scalar.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }

    /// Creates a text scalar.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Text(value.into()))
    }

    /// Converts a JSON value.
    ///
    /// Rectangular nested arrays of numbers become [`NumericArray`]s; booleans,
    /// nulls, objects, ragged, mixed or empty arrays become opaque.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::int(i),
                None => Self::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::text(s.clone()),
            Value::Array(items) => flatten_numeric(items).map_or_else(
                || Self::Opaque(describe_array(items).to_string()),
                Self::Array,
            ),
            Value::Bool(_) => Self::Opaque("bool".to_string()),
            Value::Null => Self::Opaque("null".to_string()),
            Value::Object(_) => Self::Opaque("object".to_string()),
        }
    }

    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(Scalar::Int(_)) => ValueKind::Int,
            Self::Scalar(Scalar::Float(_)) => ValueKind::Float,
            Self::Scalar(Scalar::Text(_)) => ValueKind::Text,
            Self::Array(array) => match array.dtype {
                DType::Int => ValueKind::IntArray,
                DType::Float => ValueKind::FloatArray,
            },
            Self::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Returns the numeric shape: the array shape, or `[]` for numeric
    /// scalars. `None` for text and opaque values.
    #[must_use]
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Self::Array(array) => Some(array.shape()),
            Self::Scalar(Scalar::Int(_) | Scalar::Float(_)) => Some(&[]),
            Self::Scalar(Scalar::Text(_)) | Self::Opaque(_) => None,
        }
    }
}

fn describe_array(items: &[Value]) -> &'static str {
    if items.is_empty() {
        "empty array"
    } else if items.iter().all(|v| v.is_number() || v.is_array()) {
        "ragged array"
    } else {
        "mixed array"
    }
}

/// Walks a nested JSON array, checking it is rectangular and numeric.
struct Flattener {
    shape: Vec<usize>,
    leaf_depth: Option<usize>,
    dtype: DType,
    values: Vec<f64>,
}

impl Flattener {
    fn visit(&mut self, items: &[Value], depth: usize) -> Option<()> {
        if items.is_empty() {
            return None;
        }
        match self.shape.get(depth) {
            Some(&len) if len != items.len() => return None,
            Some(_) => {}
            None => self.shape.push(items.len()),
        }

        if items[0].is_array() {
            if self.leaf_depth.is_some_and(|leaf| depth >= leaf) {
                return None;
            }
            for item in items {
                self.visit(item.as_array()?, depth + 1)?;
            }
        } else {
            match self.leaf_depth {
                Some(leaf) if leaf != depth => return None,
                Some(_) => {}
                None => self.leaf_depth = Some(depth),
            }
            for item in items {
                let Value::Number(n) = item else {
                    return None;
                };
                let leaf = if n.is_i64() || n.is_u64() {
                    DType::Int
                } else {
                    DType::Float
                };
                self.dtype = self.dtype.widen(leaf);
                self.values.push(n.as_f64()?);
            }
        }
        Some(())
    }
}

fn flatten_numeric(items: &[Value]) -> Option<NumericArray> {
    let mut flattener = Flattener {
        shape: Vec::new(),
        leaf_depth: None,
        dtype: DType::Int,
        values: Vec::new(),
    };
    flattener.visit(items, 0)?;
    NumericArray::new(flattener.shape, flattener.dtype, flattener.values).ok()
}
