//! Training dataset inspection for CortenForge.
//!
//! Opens a dataset, reads a bounded window of samples, and reports:
//!
//! - which fields exist, with their value kind and shape
//! - element-wise mean, standard deviation, minimum and maximum of every
//!   numeric field, computed in one pass
//! - anomalies: missing fields, shape and kind changes, unreadable samples,
//!   early exhaustion, and disagreements with declared feature types
//!
//! # Data Sources
//!
//! - [`EpisodicTable`] - on-disk table with known length, read by index
//! - [`JsonlBatchStream`] - sequential batches of unknown count
//! - [`InMemoryTable`] / [`IterBatchStream`] - in-memory equivalents
//!
//! Both access models are wrapped by [`DataSource`], which yields samples
//! lazily and never reads past the requested window.
//!
//! # Inspection
//!
//! - [`SchemaInspector`] - field kinds and shapes from the first K samples
//! - [`StatsAggregator`] - streaming per-field statistics over N samples
//! - [`Inspection`] - the state machine combining both
//! - [`InspectionReport`] - the immutable, serializable result
//!
//! # Example
//!
//! ```
//! use ml_inspect::{DataSource, FieldValue, InMemoryTable, InspectConfig, SampleRecord, inspect};
//!
//! let samples = vec![
//!     SampleRecord::new().with_field("state", FieldValue::vector(&[1.0, 2.0])),
//!     SampleRecord::new().with_field("state", FieldValue::vector(&[3.0, 4.0])),
//!     SampleRecord::new().with_field("state", FieldValue::vector(&[5.0, 6.0])),
//! ];
//! let mut source = DataSource::random_access(InMemoryTable::new(samples));
//!
//! let report = inspect(&mut source, &InspectConfig::default()).unwrap();
//! let state = report.field_stats("state").unwrap();
//! assert_eq!(state.count, 3);
//! assert_eq!(state.mean, vec![3.0, 4.0]);
//! assert!(report.anomalies.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod anomaly;
mod config;
mod error;
mod features;
mod inspect;
mod report;
mod sample;
mod schema;
mod source;
mod stats;
mod value;

// Re-export value types
pub use sample::SampleRecord;
pub use value::{DType, FieldValue, NumericArray, Scalar, ValueKind};

// Re-export inspection components
pub use anomaly::{Anomaly, AnomalyLog};
pub use inspect::{Inspection, InspectionState, inspect, inspect_descriptor};
pub use schema::{FieldSchema, ObservedShape, SchemaInspector, SchemaSummary};
pub use stats::{FieldStats, FieldSummary, StatsAggregator};

// Re-export report types
pub use report::{DatasetFacts, InspectionReport, assemble};

// Re-export sources
pub use features::{DeclaredFeature, FeatureSpec, TaggedFeature, parse_features};
pub use source::{
    Batch, BatchStream, DataSource, EpisodicTable, InMemoryTable, IterBatchStream,
    JsonlBatchStream, RandomAccessSource, Samples,
};

// Re-export configuration and errors
pub use config::{
    DATASET_HOME_ENV, DEFAULT_TASK_PREVIEW, InspectConfig, SourceDescriptor, SourceKind,
};
pub use error::{InspectError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        Anomaly, DataSource, DatasetFacts, FieldValue, InspectConfig, InspectError,
        InspectionReport, RandomAccessSource, SampleRecord, SourceDescriptor, SourceKind,
        inspect, inspect_descriptor,
    };
}
