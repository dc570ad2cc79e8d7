//! Schema inference over a probe of samples.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anomaly::Anomaly;
use crate::sample::SampleRecord;
use crate::value::ValueKind;

/// Shape of a numeric field across the probed samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedShape {
    /// Every probed occurrence had this shape (`[]` for scalars).
    Fixed(Vec<usize>),
    /// Shapes differed between probed samples.
    Variable,
}

impl ObservedShape {
    /// Returns the shape if it is fixed.
    #[must_use]
    pub fn fixed(&self) -> Option<&[usize]> {
        match self {
            Self::Fixed(shape) => Some(shape),
            Self::Variable => None,
        }
    }
}

impl std::fmt::Display for ObservedShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(shape) => write!(f, "{shape:?}"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// What the probe learned about one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Value kind, widened from int to float when both were seen.
    pub kind: ValueKind,

    /// Numeric shape; `None` for text and opaque fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ObservedShape>,

    /// Index of the first sample containing the field.
    pub first_seen: usize,

    /// Number of probed samples containing the field.
    pub occurrences: usize,

    #[serde(skip)]
    established_shape: Option<Vec<usize>>,
}

impl FieldSchema {
    fn new(kind: ValueKind, shape: Option<&[usize]>, index: usize) -> Self {
        Self {
            kind,
            shape: shape.map(|s| ObservedShape::Fixed(s.to_vec())),
            first_seen: index,
            occurrences: 1,
            established_shape: shape.map(<[usize]>::to_vec),
        }
    }
}

/// Field kinds and shapes derived from the probe, plus the anomalies found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    /// Observed fields by name.
    pub fields: BTreeMap<String, FieldSchema>,

    /// Inconsistencies between probed samples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,

    /// Number of samples the probe actually saw.
    pub probed: usize,
}

impl SchemaSummary {
    /// Returns the schema of one field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Returns `true` if no field was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Derives a [`SchemaSummary`] from the first samples of a stream.
///
/// The first occurrence of a field establishes its kind and shape. Later
/// samples that lack a known field, change its shape or change its kind
/// are recorded as anomalies; none of them halt inspection.
///
/// # Example
///
/// ```
/// use ml_inspect::{FieldValue, SampleRecord, SchemaInspector};
///
/// let mut inspector = SchemaInspector::new();
/// inspector.observe(0, &SampleRecord::new().with_field("x", FieldValue::float(1.0)));
/// inspector.observe(1, &SampleRecord::new());
///
/// let summary = inspector.summary();
/// assert_eq!(summary.probed, 2);
/// assert_eq!(summary.anomalies.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaInspector {
    fields: BTreeMap<String, FieldSchema>,
    anomalies: Vec<Anomaly>,
    probed: usize,
}

impl SchemaInspector {
    /// Creates an inspector with nothing observed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes one sample and returns the anomalies it produced.
    pub fn observe(&mut self, index: usize, sample: &SampleRecord) -> &[Anomaly] {
        let start = self.anomalies.len();
        self.probed += 1;

        for name in self.fields.keys() {
            if !sample.contains(name) {
                self.anomalies.push(Anomaly::MissingField {
                    field: name.clone(),
                    index,
                });
            }
        }

        for (name, value) in sample.iter() {
            let kind = value.kind();
            let shape = value.shape();

            let Some(schema) = self.fields.get_mut(name) else {
                self.fields
                    .insert(name.to_string(), FieldSchema::new(kind, shape, index));
                continue;
            };
            schema.occurrences += 1;

            let Some(merged) = schema.kind.merge(kind) else {
                self.anomalies.push(Anomaly::KindMismatch {
                    field: name.to_string(),
                    index,
                    expected: schema.kind,
                    found: kind,
                });
                continue;
            };
            schema.kind = merged;

            if let (Some(expected), Some(found)) = (&schema.established_shape, shape) {
                if expected.as_slice() != found {
                    self.anomalies.push(Anomaly::ShapeMismatch {
                        field: name.to_string(),
                        index,
                        expected: expected.clone(),
                        found: found.to_vec(),
                    });
                    schema.shape = Some(ObservedShape::Variable);
                }
            }
        }

        &self.anomalies[start..]
    }

    /// Returns the number of samples observed so far.
    #[must_use]
    pub const fn probed(&self) -> usize {
        self.probed
    }

    /// Returns the summary of everything observed so far.
    #[must_use]
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            fields: self.fields.clone(),
            anomalies: self.anomalies.clone(),
            probed: self.probed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn state(values: &[f64]) -> SampleRecord {
        SampleRecord::new().with_field("state", FieldValue::vector(values))
    }

    #[test]
    fn consistent_samples_have_no_anomalies() {
        let mut inspector = SchemaInspector::new();
        for i in 0..3 {
            assert!(inspector.observe(i, &state(&[1.0, 2.0])).is_empty());
        }

        let summary = inspector.summary();
        let field = summary.field("state").unwrap();
        assert_eq!(field.kind, ValueKind::FloatArray);
        assert_eq!(field.shape, Some(ObservedShape::Fixed(vec![2])));
        assert_eq!(field.occurrences, 3);
        assert_eq!(field.first_seen, 0);
        assert!(summary.anomalies.is_empty());
    }

    #[test]
    fn missing_field_reported_once_per_sample() {
        let mut inspector = SchemaInspector::new();
        let full = SampleRecord::new()
            .with_field("x", FieldValue::float(1.0))
            .with_field("y", FieldValue::float(2.0));
        let partial = SampleRecord::new().with_field("y", FieldValue::float(2.0));

        inspector.observe(0, &full);
        inspector.observe(1, &full);
        let found = inspector.observe(2, &partial).to_vec();
        inspector.observe(3, &full);

        assert_eq!(
            found,
            vec![Anomaly::MissingField {
                field: "x".to_string(),
                index: 2
            }]
        );
        assert_eq!(inspector.summary().anomalies.len(), 1);
        assert_eq!(inspector.summary().field("x").unwrap().occurrences, 3);
    }

    #[test]
    fn late_field_is_not_an_anomaly() {
        let mut inspector = SchemaInspector::new();
        inspector.observe(0, &SampleRecord::new());
        inspector.observe(1, &state(&[1.0]));

        let summary = inspector.summary();
        assert!(summary.anomalies.is_empty());
        assert_eq!(summary.field("state").unwrap().first_seen, 1);
    }

    #[test]
    fn shape_change_marks_variable() {
        let mut inspector = SchemaInspector::new();
        inspector.observe(0, &state(&[1.0, 2.0]));
        inspector.observe(1, &state(&[1.0, 2.0, 3.0]));
        inspector.observe(2, &state(&[1.0, 2.0, 3.0]));

        let summary = inspector.summary();
        assert_eq!(
            summary.field("state").unwrap().shape,
            Some(ObservedShape::Variable)
        );
        assert_eq!(summary.anomalies.len(), 2);
        assert!(matches!(
            &summary.anomalies[0],
            Anomaly::ShapeMismatch { index: 1, expected, found, .. }
                if expected == &vec![2] && found == &vec![3]
        ));
    }

    #[test]
    fn kind_change_is_reported() {
        let mut inspector = SchemaInspector::new();
        inspector.observe(0, &SampleRecord::new().with_field("t", FieldValue::float(0.1)));
        inspector.observe(1, &SampleRecord::new().with_field("t", FieldValue::text("n/a")));

        let summary = inspector.summary();
        assert_eq!(summary.field("t").unwrap().kind, ValueKind::Float);
        assert!(matches!(
            summary.anomalies.as_slice(),
            [Anomaly::KindMismatch {
                expected: ValueKind::Float,
                found: ValueKind::Text,
                ..
            }]
        ));
    }

    #[test]
    fn int_then_float_widens() {
        let mut inspector = SchemaInspector::new();
        inspector.observe(0, &SampleRecord::new().with_field("t", FieldValue::int(0)));
        inspector.observe(1, &SampleRecord::new().with_field("t", FieldValue::float(0.5)));

        let summary = inspector.summary();
        assert_eq!(summary.field("t").unwrap().kind, ValueKind::Float);
        assert_eq!(
            summary.field("t").unwrap().shape,
            Some(ObservedShape::Fixed(vec![]))
        );
        assert!(summary.anomalies.is_empty());
    }

    #[test]
    fn text_fields_have_no_shape() {
        let mut inspector = SchemaInspector::new();
        inspector.observe(0, &SampleRecord::new().with_field("task", FieldValue::text("fold")));
        assert_eq!(inspector.summary().field("task").unwrap().shape, None);
    }

    #[test]
    fn summary_is_deterministic() {
        let samples = [state(&[1.0]), SampleRecord::new(), state(&[1.0, 2.0])];
        let run = || {
            let mut inspector = SchemaInspector::new();
            for (i, s) in samples.iter().enumerate() {
                inspector.observe(i, s);
            }
            serde_json::to_string(&inspector.summary()).unwrap_or_default()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn observed_shape_display() {
        assert_eq!(ObservedShape::Fixed(vec![3, 2]).to_string(), "[3, 2]");
        assert_eq!(ObservedShape::Variable.to_string(), "variable");
        assert_eq!(ObservedShape::Variable.fixed(), None);
    }
}
