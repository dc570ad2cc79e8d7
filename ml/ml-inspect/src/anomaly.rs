//! Recoverable inspection anomalies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::value::ValueKind;

/// A recoverable problem found while inspecting a dataset.
///
/// Anomalies are embedded in the report; they never abort an inspection.
/// Sample indices are zero-based positions in the inspected stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A sample lacks a field seen in an earlier sample.
    MissingField {
        /// Field name.
        field: String,
        /// Sample index.
        index: usize,
    },

    /// A numeric field changed shape.
    ShapeMismatch {
        /// Field name.
        field: String,
        /// Sample index.
        index: usize,
        /// Shape established by the first occurrence.
        expected: Vec<usize>,
        /// Shape found in this sample.
        found: Vec<usize>,
    },

    /// A field changed kind (e.g. numeric to text).
    KindMismatch {
        /// Field name.
        field: String,
        /// Sample index.
        index: usize,
        /// Kind established by earlier samples.
        expected: ValueKind,
        /// Kind found in this sample.
        found: ValueKind,
    },

    /// A sample could not be decoded and was skipped.
    UnreadableSample {
        /// Sample index.
        index: usize,
        /// Reason for failure.
        reason: String,
    },

    /// The source produced fewer samples than requested.
    SourceExhausted {
        /// Number of samples requested.
        requested: usize,
        /// Number of samples produced.
        produced: usize,
    },

    /// The observed shape differs from the declared feature shape.
    DeclaredShapeMismatch {
        /// Field name.
        field: String,
        /// Declared shape.
        declared: Vec<usize>,
        /// Observed shape.
        observed: Vec<usize>,
    },

    /// A declared feature never appeared in the inspected samples.
    MissingDeclaredField {
        /// Field name.
        field: String,
    },
}

impl Anomaly {
    /// Returns the field this anomaly refers to, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. }
            | Self::ShapeMismatch { field, .. }
            | Self::KindMismatch { field, .. }
            | Self::DeclaredShapeMismatch { field, .. }
            | Self::MissingDeclaredField { field } => Some(field),
            Self::UnreadableSample { .. } | Self::SourceExhausted { .. } => None,
        }
    }

    /// Returns the sample index this anomaly refers to, if any.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::MissingField { index, .. }
            | Self::ShapeMismatch { index, .. }
            | Self::KindMismatch { index, .. }
            | Self::UnreadableSample { index, .. } => Some(*index),
            Self::SourceExhausted { .. }
            | Self::DeclaredShapeMismatch { .. }
            | Self::MissingDeclaredField { .. } => None,
        }
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { field, index } => {
                write!(f, "sample {index}: missing field '{field}'")
            }
            Self::ShapeMismatch {
                field,
                index,
                expected,
                found,
            } => write!(
                f,
                "sample {index}: field '{field}' has shape {found:?}, expected {expected:?}"
            ),
            Self::KindMismatch {
                field,
                index,
                expected,
                found,
            } => write!(
                f,
                "sample {index}: field '{field}' is {found}, expected {expected}"
            ),
            Self::UnreadableSample { index, reason } => {
                write!(f, "sample {index}: unreadable ({reason})")
            }
            Self::SourceExhausted {
                requested,
                produced,
            } => write!(
                f,
                "source exhausted after {produced} of {requested} samples"
            ),
            Self::DeclaredShapeMismatch {
                field,
                declared,
                observed,
            } => write!(
                f,
                "field '{field}' observed with shape {observed:?}, declared {declared:?}"
            ),
            Self::MissingDeclaredField { field } => {
                write!(f, "declared field '{field}' never observed")
            }
        }
    }
}

/// Ordered anomaly list that ignores exact duplicates.
///
/// The schema inspector and the stats aggregator watch the same samples
/// and may both notice the same problem; it is reported once.
#[derive(Debug, Clone, Default)]
pub struct AnomalyLog {
    entries: Vec<Anomaly>,
    seen: HashSet<Anomaly>,
}

impl AnomalyLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an anomaly. Returns `false` if it was already recorded.
    pub fn push(&mut self, anomaly: Anomaly) -> bool {
        if self.seen.contains(&anomaly) {
            return false;
        }
        warn!("{anomaly}");
        self.seen.insert(anomaly.clone());
        self.entries.push(anomaly);
        true
    }

    /// Records every anomaly from an iterator.
    pub fn extend(&mut self, anomalies: impl IntoIterator<Item = Anomaly>) {
        for anomaly in anomalies {
            self.push(anomaly);
        }
    }

    /// Returns the recorded anomalies in order.
    #[must_use]
    pub fn entries(&self) -> &[Anomaly] {
        &self.entries
    }

    /// Returns the number of recorded anomalies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the log, returning the anomalies in order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Anomaly> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(field: &str, index: usize) -> Anomaly {
        Anomaly::MissingField {
            field: field.to_string(),
            index,
        }
    }

    #[test]
    fn anomaly_field_and_index() {
        let anomaly = missing("x", 2);
        assert_eq!(anomaly.field(), Some("x"));
        assert_eq!(anomaly.index(), Some(2));

        let exhausted = Anomaly::SourceExhausted {
            requested: 10,
            produced: 3,
        };
        assert_eq!(exhausted.field(), None);
        assert_eq!(exhausted.index(), None);
    }

    #[test]
    fn anomaly_display() {
        let anomaly = Anomaly::ShapeMismatch {
            field: "state".to_string(),
            index: 4,
            expected: vec![2],
            found: vec![3],
        };
        let text = anomaly.to_string();
        assert!(text.contains("sample 4"));
        assert!(text.contains("[3]"));
        assert!(text.contains("[2]"));
    }

    #[test]
    fn anomaly_serialization_is_tagged() {
        let json = serde_json::to_string(&missing("x", 2)).unwrap_or_default();
        assert!(json.contains(r#""kind":"missing_field""#));
        assert!(json.contains(r#""index":2"#));
    }

    #[test]
    fn log_ignores_duplicates() {
        let mut log = AnomalyLog::new();
        assert!(log.push(missing("x", 2)));
        assert!(!log.push(missing("x", 2)));
        assert!(log.push(missing("x", 3)));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn log_preserves_order() {
        let mut log = AnomalyLog::new();
        log.extend([missing("b", 1), missing("a", 0), missing("b", 1)]);
        assert_eq!(log.into_vec(), vec![missing("b", 1), missing("a", 0)]);
    }

    #[test]
    fn log_empty() {
        let log = AnomalyLog::new();
        assert!(log.is_empty());
        assert!(log.entries().is_empty());
    }
}
