//! Streaming per-field statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anomaly::Anomaly;
use crate::sample::SampleRecord;
use crate::value::{FieldValue, Scalar};

/// Running accumulator for one numeric field.
///
/// Holds count, element-wise sum, sum of squares, minimum and maximum for
/// a fixed shape. Memory does not grow with the number of samples.
///
/// Sums are kept in units of a per-element power-of-two scale no smaller
/// than half the largest magnitude seen, so they stay finite for any finite
/// input. Rescaling by a power of two is exact.
///
/// # Example
///
/// ```
/// use ml_inspect::FieldStats;
///
/// let mut stats = FieldStats::new(&[2]);
/// stats.observe(&[2], &[1.0, 2.0]);
/// stats.observe(&[2], &[3.0, 4.0]);
///
/// let summary = stats.finalize().unwrap();
/// assert_eq!(summary.mean, vec![2.0, 3.0]);
/// assert_eq!(summary.std, vec![1.0, 1.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStats {
    shape: Vec<usize>,
    count: u64,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    scale: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl FieldStats {
    /// Creates an empty accumulator for the given shape (`[]` for scalars).
    #[must_use]
    pub fn new(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            count: 0,
            sum: vec![0.0; len],
            sum_sq: vec![0.0; len],
            scale: vec![1.0; len],
            min: vec![f64::INFINITY; len],
            max: vec![f64::NEG_INFINITY; len],
        }
    }

    /// Returns the established shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of accepted observations.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Adds one observation.
    ///
    /// Returns `false` and leaves the accumulator untouched if the shape
    /// does not match the established one.
    pub fn observe(&mut self, shape: &[usize], values: &[f64]) -> bool {
        if shape != self.shape.as_slice() || values.len() != self.sum.len() {
            return false;
        }
        self.count += 1;
        for (i, &v) in values.iter().enumerate() {
            self.rescale(i, v.abs());
            let x = v / self.scale[i];
            self.sum[i] += x;
            self.sum_sq[i] += x * x;
            self.min[i] = self.min[i].min(v);
            self.max[i] = self.max[i].max(v);
        }
        true
    }

    /// Derives mean, population standard deviation, minimum and maximum.
    ///
    /// Returns `None` if nothing was observed.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn finalize(&self) -> Option<FieldSummary> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;

        let mut mean = Vec::with_capacity(self.sum.len());
        let mut std = Vec::with_capacity(self.sum.len());
        for (i, sum) in self.sum.iter().enumerate() {
            let m = sum / n;
            mean.push(m * self.scale[i]);
            // Constant element: exactly zero.
            if self.min[i] == self.max[i] {
                std.push(0.0);
                continue;
            }
            let variance = m.mul_add(-m, self.sum_sq[i] / n);
            std.push(variance.max(0.0).sqrt() * self.scale[i]);
        }

        Some(FieldSummary {
            count: self.count,
            shape: self.shape.clone(),
            mean,
            std,
            min: self.min.clone(),
            max: self.max.clone(),
        })
    }

    /// Raises the scale of element `i` to cover `magnitude`.
    fn rescale(&mut self, i: usize, magnitude: f64) {
        if !magnitude.is_finite() || magnitude < 2.0 * self.scale[i] {
            return;
        }
        let scale = power_of_two_floor(magnitude);
        let ratio = self.scale[i] / scale;
        self.sum[i] *= ratio;
        self.sum_sq[i] *= ratio * ratio;
        self.scale[i] = scale;
    }
}

/// Largest power of two not above `x`, for finite `x >= 1`.
fn power_of_two_floor(x: f64) -> f64 {
    f64::from_bits(x.to_bits() & 0x7ff0_0000_0000_0000)
}

/// Finalized statistics for one field.
///
/// All vectors are row-major and have one element per array element
/// (a single element for scalar fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Number of samples that contributed.
    pub count: u64,

    /// Field shape (`[]` for scalars).
    pub shape: Vec<usize>,

    /// Element-wise mean.
    pub mean: Vec<f64>,

    /// Element-wise population standard deviation.
    pub std: Vec<f64>,

    /// Element-wise minimum.
    pub min: Vec<f64>,

    /// Element-wise maximum.
    pub max: Vec<f64>,
}

/// Maintains one [`FieldStats`] per numeric field of a sample stream.
///
/// The first occurrence of a field establishes its shape. Later occurrences
/// with another shape are skipped and reported. Text and opaque values are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    fields: BTreeMap<String, FieldStats>,
}

impl StatsAggregator {
    /// Creates an aggregator with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the accumulators and returns the anomalies it
    /// produced.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe(&mut self, index: usize, sample: &SampleRecord) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for name in self.fields.keys() {
            if !sample.contains(name) {
                anomalies.push(Anomaly::MissingField {
                    field: name.clone(),
                    index,
                });
            }
        }

        for (name, value) in sample.iter() {
            let promoted;
            let (shape, values): (&[usize], &[f64]) = match value {
                FieldValue::Array(array) => (array.shape(), array.values()),
                FieldValue::Scalar(Scalar::Float(v)) => (&[], std::slice::from_ref(v)),
                FieldValue::Scalar(Scalar::Int(v)) => {
                    promoted = *v as f64;
                    (&[], std::slice::from_ref(&promoted))
                }
                FieldValue::Scalar(Scalar::Text(_)) | FieldValue::Opaque(_) => continue,
            };

            let stats = self
                .fields
                .entry(name.to_string())
                .or_insert_with(|| FieldStats::new(shape));
            if !stats.observe(shape, values) {
                anomalies.push(Anomaly::ShapeMismatch {
                    field: name.to_string(),
                    index,
                    expected: stats.shape().to_vec(),
                    found: shape.to_vec(),
                });
            }
        }

        anomalies
    }

    /// Returns the accumulator for a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldStats> {
        self.fields.get(name)
    }

    /// Finalizes every field with at least one observation.
    #[must_use]
    pub fn finalize(&self) -> BTreeMap<String, FieldSummary> {
        self.fields
            .iter()
            .filter_map(|(name, stats)| stats.finalize().map(|s| (name.clone(), s)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(values: &[f64]) -> SampleRecord {
        SampleRecord::new().with_field("state", FieldValue::vector(values))
    }

    #[test]
    fn stats_empty_finalize_is_none() {
        let stats = FieldStats::new(&[3]);
        assert_eq!(stats.count(), 0);
        assert!(stats.finalize().is_none());
    }

    #[test]
    fn stats_three_states() {
        let mut agg = StatsAggregator::new();
        agg.observe(0, &state(&[1.0, 2.0]));
        agg.observe(1, &state(&[3.0, 4.0]));
        agg.observe(2, &state(&[5.0, 6.0]));

        let out = agg.finalize();
        let s = &out["state"];
        assert_eq!(s.count, 3);
        assert_eq!(s.shape, vec![2]);
        assert_relative_eq!(s.mean[0], 3.0);
        assert_relative_eq!(s.mean[1], 4.0);
        assert_eq!(s.min, vec![1.0, 2.0]);
        assert_eq!(s.max, vec![5.0, 6.0]);
        assert_relative_eq!(s.std[0], 1.633, epsilon = 1e-3);
        assert_relative_eq!(s.std[1], 1.633, epsilon = 1e-3);
    }

    #[test]
    fn stats_constant_values_have_zero_std() {
        let mut stats = FieldStats::new(&[]);
        for _ in 0..7 {
            stats.observe(&[], &[0.1]);
        }
        let summary = stats.finalize().unwrap();
        assert_eq!(summary.std, vec![0.0]);
        assert_relative_eq!(summary.mean[0], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn stats_variance_never_negative() {
        let mut stats = FieldStats::new(&[]);
        for v in [1e8 + 0.1, 1e8 + 0.1, 1e8 + 0.2] {
            stats.observe(&[], &[v]);
        }
        let summary = stats.finalize().unwrap();
        assert!(summary.std[0] >= 0.0);
        assert!(summary.std[0].is_finite());
    }

    #[test]
    fn stats_shape_mismatch_skipped() {
        let mut agg = StatsAggregator::new();
        agg.observe(0, &state(&[1.0, 2.0]));
        let found = agg.observe(1, &state(&[1.0, 2.0, 3.0]));
        agg.observe(2, &state(&[3.0, 4.0]));

        assert_eq!(
            found,
            vec![Anomaly::ShapeMismatch {
                field: "state".to_string(),
                index: 1,
                expected: vec![2],
                found: vec![3],
            }]
        );
        assert_eq!(agg.finalize()["state"].count, 2);
    }

    #[test]
    fn stats_integers_promoted() {
        let mut agg = StatsAggregator::new();
        for (i, v) in [i64::MAX, i64::MAX].into_iter().enumerate() {
            agg.observe(i, &SampleRecord::new().with_field("n", FieldValue::int(v)));
        }
        let out = agg.finalize();
        #[allow(clippy::cast_precision_loss)]
        let expected = i64::MAX as f64;
        assert_relative_eq!(out["n"].mean[0], expected);
        assert_eq!(out["n"].shape, Vec::<usize>::new());
    }

    #[test]
    fn stats_ignore_text_and_opaque() {
        let mut agg = StatsAggregator::new();
        let sample = SampleRecord::new()
            .with_field("task", FieldValue::text("fold"))
            .with_field("image", FieldValue::Opaque("object".to_string()));
        agg.observe(0, &sample);

        assert!(agg.finalize().is_empty());
        assert!(agg.field("task").is_none());
    }

    #[test]
    fn stats_missing_field_reported() {
        let mut agg = StatsAggregator::new();
        agg.observe(0, &state(&[1.0]));
        let found = agg.observe(1, &SampleRecord::new());
        assert_eq!(
            found,
            vec![Anomaly::MissingField {
                field: "state".to_string(),
                index: 1
            }]
        );
        assert!(agg.observe(2, &state(&[2.0])).is_empty());
    }

    #[test]
    fn stats_huge_values_stay_finite() {
        let mut agg = StatsAggregator::new();
        agg.observe(0, &SampleRecord::new().with_field("x", FieldValue::float(1e200)));
        agg.observe(1, &SampleRecord::new().with_field("x", FieldValue::float(-1e200)));

        let out = agg.finalize();
        let x = &out["x"];
        assert_relative_eq!(x.mean[0], 0.0);
        assert_relative_eq!(x.std[0], 1e200, max_relative = 1e-12);
        assert_eq!(x.min, vec![-1e200]);
        assert_eq!(x.max, vec![1e200]);

        let json = serde_json::to_string(x).unwrap();
        assert!(!json.contains("null"));
        let parsed: FieldSummary = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(parsed.std[0], 1e200, max_relative = 1e-12);
    }

    #[test]
    fn stats_scale_growth_keeps_small_values() {
        let mut stats = FieldStats::new(&[]);
        for v in [1.0, 3.0, f64::MAX / 4.0, -f64::MAX / 4.0] {
            assert!(stats.observe(&[], &[v]));
        }
        let summary = stats.finalize().unwrap();
        assert!(summary.mean[0].is_finite());
        assert!(summary.std[0].is_finite());
        assert_relative_eq!(
            summary.std[0],
            f64::MAX / 4.0 / 2f64.sqrt(),
            max_relative = 1e-9
        );
    }

    #[test]
    fn stats_matrix_fields() {
        let mut stats = FieldStats::new(&[2, 2]);
        assert!(stats.observe(&[2, 2], &[1.0, 2.0, 3.0, 4.0]));
        assert!(!stats.observe(&[4], &[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(stats.count(), 1);
    }

    #[test]
    fn summary_serialization() {
        let mut stats = FieldStats::new(&[1]);
        stats.observe(&[1], &[2.0]);
        let summary = stats.finalize().unwrap();

        let json = serde_json::to_string(&summary).unwrap_or_default();
        assert!(json.contains(r#""count":1"#));
        let parsed: FieldSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, summary);
    }
}
