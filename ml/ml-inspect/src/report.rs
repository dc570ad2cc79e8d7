//! Inspection report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::anomaly::Anomaly;
use crate::error::{InspectError, Result};
use crate::schema::SchemaSummary;
use crate::stats::FieldSummary;
use crate::value::ValueKind;

/// Dataset-level facts passed through opaquely (fps, robot type, sizes).
///
/// # Example
///
/// ```
/// use ml_inspect::DatasetFacts;
///
/// let facts = DatasetFacts::new()
///     .with("fps", 30)
///     .with("robot_type", "aloha");
/// assert_eq!(facts.get("fps"), Some(&serde_json::json!(30)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetFacts(BTreeMap<String, Value>);

impl DatasetFacts {
    /// Creates an empty set of facts.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a fact.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a fact, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Inserts every fact from another set, replacing on conflict.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Returns a fact.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Iterates facts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The result of inspecting a dataset.
///
/// Built once after the sample window is exhausted and never modified.
/// Serializes to plain nested JSON; `stats` holds only numbers and numeric
/// arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    /// Opaque dataset facts.
    pub dataset_facts: DatasetFacts,

    /// Schema derived from the probe.
    pub schema: SchemaSummary,

    /// Per-field statistics; fields never validly observed are absent.
    pub stats: BTreeMap<String, FieldSummary>,

    /// Shapes of numeric fields whose name mentions "image".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub image_fields: BTreeMap<String, Vec<usize>>,

    /// Every recoverable problem found, in discovery order.
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,

    /// Number of stream positions consumed, unreadable samples included.
    pub samples_inspected: usize,
}

/// Assembles a report from finalized parts.
///
/// Pure: performs no I/O and cannot fail.
#[must_use]
pub fn assemble(
    dataset_facts: DatasetFacts,
    schema: SchemaSummary,
    stats: BTreeMap<String, FieldSummary>,
    anomalies: Vec<Anomaly>,
    samples_inspected: usize,
) -> InspectionReport {
    let image_fields = schema
        .fields
        .iter()
        .filter(|(name, field)| {
            name.to_ascii_lowercase().contains("image")
                && matches!(field.kind, ValueKind::IntArray | ValueKind::FloatArray)
        })
        .filter_map(|(name, field)| {
            let shape = field.shape.as_ref()?.fixed()?;
            Some((name.clone(), shape.to_vec()))
        })
        .collect();

    InspectionReport {
        dataset_facts,
        schema,
        stats,
        image_fields,
        anomalies,
        samples_inspected,
    }
}

impl InspectionReport {
    /// Returns `true` if nothing was inspected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples_inspected == 0
    }

    /// Returns `true` if any anomaly was recorded.
    #[must_use]
    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }

    /// Returns the statistics of one field.
    #[must_use]
    pub fn field_stats(&self, name: &str) -> Option<&FieldSummary> {
        self.stats.get(name)
    }

    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(InspectError::from)
    }

    /// Deserializes a report from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(InspectError::from)
    }

    /// Returns a human-readable report.
    #[must_use]
    #[allow(clippy::let_underscore_must_use)] // String::write_fmt is infallible
    pub fn to_text(&self) -> String {
        use std::fmt::Write;

        let mut report = String::new();
        let _ = writeln!(report, "Dataset Inspection");
        let _ = writeln!(report, "==================");
        for (key, value) in self.dataset_facts.iter() {
            let _ = writeln!(report, "{key}: {value}");
        }
        let _ = writeln!(report, "Samples inspected: {}", self.samples_inspected);

        let _ = writeln!(report, "\nFields ({} probed):", self.schema.probed);
        for (name, field) in &self.schema.fields {
            match &field.shape {
                Some(shape) => {
                    let _ = writeln!(report, "  - {name}: {} shape={shape}", field.kind);
                }
                None => {
                    let _ = writeln!(report, "  - {name}: {}", field.kind);
                }
            }
        }

        if !self.stats.is_empty() {
            let _ = writeln!(report, "\nStatistics:");
            for (name, stats) in &self.stats {
                let _ = writeln!(report, "  {name} (count={}):", stats.count);
                let _ = writeln!(report, "    mean: {}", format_values(&stats.mean));
                let _ = writeln!(report, "    std:  {}", format_values(&stats.std));
                let _ = writeln!(report, "    min:  {}", format_values(&stats.min));
                let _ = writeln!(report, "    max:  {}", format_values(&stats.max));
            }
        }

        if !self.image_fields.is_empty() {
            let _ = writeln!(report, "\nImage fields:");
            for (name, shape) in &self.image_fields {
                let _ = writeln!(report, "  - {name}: {shape:?}");
            }
        }

        if !self.anomalies.is_empty() {
            let _ = writeln!(report, "\nAnomalies ({}):", self.anomalies.len());
            for anomaly in &self.anomalies {
                let _ = writeln!(report, "  - {anomaly}");
            }
        }

        report
    }
}

fn format_values(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleRecord;
    use crate::schema::SchemaInspector;
    use crate::stats::StatsAggregator;
    use crate::value::FieldValue;

    fn sample_report() -> InspectionReport {
        let samples = [
            SampleRecord::new()
                .with_field("state", FieldValue::vector(&[1.0, 2.0]))
                .with_field("observation.image", FieldValue::vector(&[0.0; 4]))
                .with_field("task", FieldValue::text("fold")),
            SampleRecord::new()
                .with_field("state", FieldValue::vector(&[3.0, 4.0]))
                .with_field("observation.image", FieldValue::vector(&[1.0; 4])),
        ];
        let mut schema = SchemaInspector::new();
        let mut stats = StatsAggregator::new();
        for (i, sample) in samples.iter().enumerate() {
            schema.observe(i, sample);
            stats.observe(i, sample);
        }
        let summary = schema.summary();
        let anomalies = summary.anomalies.clone();
        assemble(
            DatasetFacts::new().with("fps", 30),
            summary,
            stats.finalize(),
            anomalies,
            samples.len(),
        )
    }

    #[test]
    fn facts_builder() {
        let facts = DatasetFacts::new().with("fps", 50).with("robot_type", "koch");
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.get("robot_type"), Some(&Value::from("koch")));
        assert!(!facts.is_empty());
    }

    #[test]
    fn facts_extend_replaces() {
        let mut facts = DatasetFacts::new().with("fps", 10);
        facts.extend(DatasetFacts::new().with("fps", 30).with("length", 5));
        assert_eq!(facts.get("fps"), Some(&Value::from(30)));
        assert_eq!(facts.len(), 2);
    }

    #[test]
    fn assemble_lists_image_fields() {
        let report = sample_report();
        assert_eq!(
            report.image_fields.get("observation.image"),
            Some(&vec![4])
        );
        assert!(!report.image_fields.contains_key("state"));
    }

    #[test]
    fn assemble_keeps_parts() {
        let report = sample_report();
        assert_eq!(report.samples_inspected, 2);
        assert_eq!(report.field_stats("state").map(|s| s.count), Some(2));
        assert!(report.field_stats("task").is_none());
        assert!(report.has_anomalies());
        assert!(!report.is_empty());
    }

    #[test]
    fn report_to_text() {
        let text = sample_report().to_text();
        assert!(text.contains("fps: 30"));
        assert!(text.contains("Samples inspected: 2"));
        assert!(text.contains("state (count=2)"));
        assert!(text.contains("mean: [2.0000, 3.0000]"));
        assert!(text.contains("missing field 'task'"));
    }

    #[test]
    fn report_serialization() {
        let report = sample_report();
        let json = report.to_json();
        assert!(json.is_ok());

        let parsed = InspectionReport::from_json(&json.unwrap_or_default());
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap_or_else(|_| report.clone()), report);
    }

    #[test]
    fn report_json_stats_are_numeric() {
        let json = sample_report().to_json().unwrap_or_default();
        let value: Value = serde_json::from_str(&json).unwrap_or_default();
        let stats = value["stats"]["state"].as_object().cloned().unwrap_or_default();
        for (key, entry) in stats {
            match entry {
                Value::Number(_) => {}
                Value::Array(items) => assert!(items.iter().all(Value::is_number), "{key}"),
                other => panic!("non-numeric stats entry {key}: {other}"),
            }
        }
    }
}
