//! Sample record types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InspectError, Result};
use crate::value::FieldValue;

/// A single dataset sample, normalized from either source variant.
///
/// Fields are kept in name order so that everything derived from a record
/// is deterministic.
///
/// # Example
///
/// ```
/// use ml_inspect::{FieldValue, SampleRecord};
///
/// let sample = SampleRecord::new()
///     .with_field("state", FieldValue::vector(&[1.0, 2.0]))
///     .with_field("task", FieldValue::text("stack blocks"));
///
/// assert_eq!(sample.len(), 2);
/// assert!(sample.contains("state"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl SampleRecord {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field, replacing any previous value with the same name.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a field, replacing any previous value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Builds a record from a JSON object.
    #[must_use]
    pub fn from_json_map(map: &serde_json::Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
            .collect();
        Self { fields }
    }

    /// Parses a record from one line of JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a JSON object.
    pub fn from_json_str(line: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(map) => Ok(Self::from_json_map(&map)),
            other => Err(InspectError::serialization(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns `true` if the record has the field.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for SampleRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
