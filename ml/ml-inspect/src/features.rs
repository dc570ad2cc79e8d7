//! Declared feature types from dataset metadata.
//!
//! Datasets describe their fields in `meta/info.json` under `features`.
//! Two declaration styles exist in the wild:
//!
//! - episodic tables: `{"dtype": "float32", "shape": [6], "names": [...]}`
//! - tagged feature trees: `{"_type": "Sequence", "feature": {...}, "length": 6}`
//!
//! Older writers emit `"List"` (or `"list"`) where newer readers expect
//! `"Sequence"`; both spellings deserialize to [`TaggedFeature::Sequence`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A feature declaration in either style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureSpec {
    /// `_type`-tagged feature tree.
    Tagged(TaggedFeature),
    /// Flat `dtype` + `shape` declaration.
    Declared(DeclaredFeature),
}

/// Flat feature declaration used by episodic tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredFeature {
    /// Element type name (`float32`, `int64`, `string`, `image`, `video`, ...).
    pub dtype: String,

    /// Declared shape.
    #[serde(default)]
    pub shape: Vec<usize>,

    /// Optional per-dimension names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Value>,
}

/// `_type`-tagged feature tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum TaggedFeature {
    /// Scalar value.
    Value {
        /// Element type name.
        dtype: String,
    },

    /// Sequence of a nested feature; `length` of `-1` means variable.
    #[serde(alias = "List", alias = "list", alias = "LargeList")]
    Sequence {
        /// Element feature.
        feature: Box<FeatureSpec>,
        /// Fixed length, or `-1`.
        #[serde(default = "variable_length")]
        length: i64,
    },

    /// Fixed-shape array.
    #[serde(alias = "Array2D", alias = "Array3D", alias = "Array4D", alias = "Array5D")]
    Array {
        /// Declared shape.
        shape: Vec<usize>,
        /// Element type name.
        dtype: String,
    },

    /// Categorical label.
    ClassLabel {},

    /// Encoded image.
    Image {},

    /// Encoded video frame.
    VideoFrame {},
}

const fn variable_length() -> i64 {
    -1
}

fn is_numeric_dtype(dtype: &str) -> bool {
    let dtype = dtype.to_ascii_lowercase();
    dtype.starts_with("float")
        || dtype.starts_with("int")
        || dtype.starts_with("uint")
        || dtype == "bool"
        || dtype == "double"
}

impl FeatureSpec {
    /// Returns the numeric shape this feature declares.
    ///
    /// `None` for non-numeric features (text, images, videos) and for
    /// sequences of variable length.
    #[must_use]
    pub fn numeric_shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Declared(declared) => {
                is_numeric_dtype(&declared.dtype).then(|| declared.shape.clone())
            }
            Self::Tagged(tagged) => tagged.numeric_shape(),
        }
    }

    /// Returns a short type name for reports.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Declared(declared) => declared.dtype.clone(),
            Self::Tagged(TaggedFeature::Value { dtype } | TaggedFeature::Array { dtype, .. }) => {
                dtype.clone()
            }
            Self::Tagged(TaggedFeature::Sequence { feature, .. }) => {
                format!("sequence<{}>", feature.type_name())
            }
            Self::Tagged(TaggedFeature::ClassLabel {}) => "class_label".to_string(),
            Self::Tagged(TaggedFeature::Image {}) => "image".to_string(),
            Self::Tagged(TaggedFeature::VideoFrame {}) => "video_frame".to_string(),
        }
    }

    /// Returns `true` if the feature is stored outside the frame table.
    ///
    /// Video streams live in separate files and never appear in frames.
    #[must_use]
    pub fn is_external(&self) -> bool {
        match self {
            Self::Declared(declared) => declared.dtype.eq_ignore_ascii_case("video"),
            Self::Tagged(tagged) => matches!(tagged, TaggedFeature::VideoFrame {}),
        }
    }

    /// Returns `true` if an observed numeric shape satisfies this declaration.
    ///
    /// Scalars are commonly declared with shape `[1]`; an observed scalar
    /// (`[]`) satisfies that.
    #[must_use]
    pub fn accepts_shape(&self, observed: &[usize]) -> bool {
        match self.numeric_shape() {
            None => true,
            Some(declared) => {
                declared.as_slice() == observed || (declared == [1] && observed.is_empty())
            }
        }
    }
}

impl TaggedFeature {
    fn numeric_shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Value { dtype } => is_numeric_dtype(dtype).then(Vec::new),
            Self::Array { shape, dtype } => is_numeric_dtype(dtype).then(|| shape.clone()),
            Self::Sequence { feature, length } => {
                let length = usize::try_from(*length).ok()?;
                let mut shape = vec![length];
                shape.extend(feature.numeric_shape()?);
                Some(shape)
            }
            Self::ClassLabel {} => Some(Vec::new()),
            Self::Image {} | Self::VideoFrame {} => None,
        }
    }
}

/// Parses a `features` object, skipping entries that match neither style.
#[must_use]
pub fn parse_features(features: &serde_json::Map<String, Value>) -> BTreeMap<String, FeatureSpec> {
    features
        .iter()
        .filter_map(|(name, value)| {
            match serde_json::from_value::<FeatureSpec>(value.clone()) {
                Ok(spec) => Some((name.clone(), spec)),
                Err(err) => {
                    warn!("ignoring feature '{name}' with unrecognized declaration: {err}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> FeatureSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn declared_float_vector() {
        let feature = spec(json!({"dtype": "float32", "shape": [6], "names": ["a"]}));
        assert!(matches!(feature, FeatureSpec::Declared(_)));
        assert_eq!(feature.numeric_shape(), Some(vec![6]));
        assert_eq!(feature.type_name(), "float32");
    }

    #[test]
    fn declared_image_has_no_numeric_shape() {
        let feature = spec(json!({"dtype": "video", "shape": [480, 640, 3]}));
        assert_eq!(feature.numeric_shape(), None);
        assert!(feature.accepts_shape(&[1, 2, 3]));
        assert!(feature.is_external());
        assert!(!spec(json!({"dtype": "image", "shape": [4]})).is_external());
    }

    #[test]
    fn sequence_and_list_are_equivalent() {
        let sequence = spec(json!({
            "_type": "Sequence",
            "feature": {"_type": "Value", "dtype": "float32"},
            "length": 7
        }));
        let list = spec(json!({
            "_type": "List",
            "feature": {"_type": "Value", "dtype": "float32"},
            "length": 7
        }));
        let lower = spec(json!({
            "_type": "list",
            "feature": {"_type": "Value", "dtype": "float32"},
            "length": 7
        }));

        assert_eq!(sequence, list);
        assert_eq!(list, lower);
        assert_eq!(list.numeric_shape(), Some(vec![7]));
        assert_eq!(list.type_name(), "sequence<float32>");
    }

    #[test]
    fn variable_sequence_has_no_shape() {
        let feature = spec(json!({
            "_type": "Sequence",
            "feature": {"_type": "Value", "dtype": "int64"}
        }));
        assert_eq!(feature.numeric_shape(), None);
    }

    #[test]
    fn nested_sequence() {
        let feature = spec(json!({
            "_type": "Sequence",
            "length": 2,
            "feature": {
                "_type": "Sequence",
                "length": 3,
                "feature": {"_type": "Value", "dtype": "float64"}
            }
        }));
        assert_eq!(feature.numeric_shape(), Some(vec![2, 3]));
    }

    #[test]
    fn image_ignores_extra_keys() {
        let feature = spec(json!({"_type": "Image", "decode": true}));
        assert_eq!(feature.numeric_shape(), None);
        assert_eq!(feature.type_name(), "image");
    }

    #[test]
    fn scalar_declared_as_one() {
        let feature = spec(json!({"dtype": "float32", "shape": [1]}));
        assert!(feature.accepts_shape(&[]));
        assert!(feature.accepts_shape(&[1]));
        assert!(!feature.accepts_shape(&[2]));
    }

    #[test]
    fn parse_features_skips_unknown() {
        let features = json!({
            "state": {"dtype": "float32", "shape": [2]},
            "weird": 42,
        });
        let parsed = parse_features(features.as_object().unwrap());
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("state"));
    }
}
