//! Inspection engine.
//!
//! [`Inspection`] consumes samples one position at a time. The first K
//! positions go to the schema probe, every position goes to the statistics
//! aggregator, and recoverable errors become anomalies. [`inspect`] drives
//! an inspection over a [`DataSource`].

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::anomaly::{Anomaly, AnomalyLog};
use crate::config::{InspectConfig, SourceDescriptor};
use crate::error::{InspectError, Result};
use crate::features::FeatureSpec;
use crate::report::{DatasetFacts, InspectionReport, assemble};
use crate::sample::SampleRecord;
use crate::schema::{ObservedShape, SchemaInspector, SchemaSummary};
use crate::source::DataSource;
use crate::stats::StatsAggregator;

/// Lifecycle of an inspection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InspectionState {
    /// No sample consumed yet.
    #[default]
    NotStarted,
    /// Consuming samples inside the schema probe.
    Probing,
    /// Consuming samples past the probe.
    Aggregating,
    /// Report produced.
    Finalized,
    /// Aborted by a fatal error.
    Failed(InspectError),
}

impl InspectionState {
    /// Returns the state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Probing => "probing",
            Self::Aggregating => "aggregating",
            Self::Finalized => "finalized",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns `true` once no more samples are accepted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed(_))
    }
}

impl std::fmt::Display for InspectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One inspection run.
///
/// # Example
///
/// ```
/// use ml_inspect::{DatasetFacts, FieldValue, InspectConfig, Inspection, SampleRecord};
/// use std::collections::BTreeMap;
///
/// let mut inspection = Inspection::new(InspectConfig::new(2)).unwrap();
/// inspection
///     .observe(0, &SampleRecord::new().with_field("x", FieldValue::float(1.0)))
///     .unwrap();
/// inspection
///     .observe(1, &SampleRecord::new().with_field("x", FieldValue::float(3.0)))
///     .unwrap();
///
/// let report = inspection.finish(DatasetFacts::new(), &BTreeMap::new()).unwrap();
/// assert_eq!(report.stats["x"].mean, vec![2.0]);
/// ```
#[derive(Debug)]
pub struct Inspection {
    config: InspectConfig,
    state: InspectionState,
    schema: SchemaInspector,
    stats: StatsAggregator,
    anomalies: AnomalyLog,
    consumed: usize,
}

impl Inspection {
    /// Creates an inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: InspectConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: InspectionState::NotStarted,
            schema: SchemaInspector::new(),
            stats: StatsAggregator::new(),
            anomalies: AnomalyLog::new(),
            consumed: 0,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> &InspectionState {
        &self.state
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &InspectConfig {
        &self.config
    }

    /// Returns the number of positions consumed so far.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Returns the anomalies recorded so far.
    #[must_use]
    pub fn anomalies(&self) -> &[Anomaly] {
        self.anomalies.entries()
    }

    fn ensure_open(&self) -> Result<()> {
        match &self.state {
            InspectionState::Finalized => {
                Err(InspectError::invalid_state("inspection already finalized"))
            }
            InspectionState::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }

    fn transition(&mut self, next: InspectionState) {
        if self.state != next {
            debug!("inspection {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn enter_position(&mut self, position: usize) {
        let next = if position < self.config.probe_size {
            InspectionState::Probing
        } else {
            InspectionState::Aggregating
        };
        self.transition(next);
        self.consumed += 1;
    }

    /// Consumes the sample at stream position `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inspection is finalized or failed.
    pub fn observe(&mut self, position: usize, sample: &SampleRecord) -> Result<()> {
        self.ensure_open()?;
        self.enter_position(position);

        let mut kind_changes = Vec::new();
        if position < self.config.probe_size {
            for anomaly in self.schema.observe(position, sample) {
                if let Anomaly::KindMismatch { field, .. } = anomaly {
                    kind_changes.push(field.clone());
                }
                self.anomalies.push(anomaly.clone());
            }
        }
        // A kind change already covers the shape change it implies.
        for anomaly in self.stats.observe(position, sample) {
            if let Anomaly::ShapeMismatch { field, .. } = &anomaly {
                if kind_changes.contains(field) {
                    continue;
                }
            }
            self.anomalies.push(anomaly);
        }
        Ok(())
    }

    /// Handles an error raised while producing samples.
    ///
    /// Unreadable samples and early exhaustion become anomalies. Any other
    /// non-fatal error is recorded against the next position. Fatal errors
    /// move the inspection to [`InspectionState::Failed`] and are returned.
    ///
    /// # Errors
    ///
    /// Returns the error itself if it is fatal, or an error if the
    /// inspection is already finalized or failed.
    pub fn record_error(&mut self, err: InspectError) -> Result<()> {
        self.ensure_open()?;
        if err.is_fatal() {
            warn!("inspection failed: {err}");
            self.transition(InspectionState::Failed(err.clone()));
            return Err(err);
        }

        match err {
            InspectError::SampleRead { index, reason } => {
                self.enter_position(index);
                self.anomalies
                    .push(Anomaly::UnreadableSample { index, reason });
            }
            InspectError::SourceExhausted {
                requested,
                produced,
            } => {
                self.anomalies.push(Anomaly::SourceExhausted {
                    requested,
                    produced,
                });
            }
            other => {
                let index = self.consumed;
                self.enter_position(index);
                self.anomalies.push(Anomaly::UnreadableSample {
                    index,
                    reason: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Finalizes the inspection and assembles the report.
    ///
    /// `features` are the dataset's declared feature types; each is checked
    /// against what the window observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the inspection is already finalized or failed.
    pub fn finish(
        &mut self,
        facts: DatasetFacts,
        features: &BTreeMap<String, FeatureSpec>,
    ) -> Result<InspectionReport> {
        self.ensure_open()?;

        let schema = self.schema.summary();
        for (name, spec) in features {
            if let Some(anomaly) = self.check_declared(&schema, name, spec) {
                self.anomalies.push(anomaly);
            }
        }

        let stats = self.stats.finalize();
        let anomalies = std::mem::take(&mut self.anomalies).into_vec();
        self.transition(InspectionState::Finalized);

        info!(
            "inspected {} samples: {} fields, {} with statistics, {} anomalies",
            self.consumed,
            schema.fields.len(),
            stats.len(),
            anomalies.len()
        );
        Ok(assemble(facts, schema, stats, anomalies, self.consumed))
    }

    fn check_declared(
        &self,
        schema: &SchemaSummary,
        name: &str,
        spec: &FeatureSpec,
    ) -> Option<Anomaly> {
        let observed = match schema.field(name) {
            Some(field) => match &field.shape {
                Some(ObservedShape::Fixed(shape)) => Some(shape.clone()),
                Some(ObservedShape::Variable) | None => None,
            },
            None => match self.stats.field(name) {
                Some(stats) => Some(stats.shape().to_vec()),
                None if self.consumed == 0 || spec.is_external() => return None,
                None => {
                    return Some(Anomaly::MissingDeclaredField {
                        field: name.to_string(),
                    });
                }
            },
        };

        let observed = observed?;
        let declared = spec.numeric_shape()?;
        (!spec.accepts_shape(&observed)).then(|| Anomaly::DeclaredShapeMismatch {
            field: name.to_string(),
            declared,
            observed,
        })
    }
}

/// Inspects up to `config.num_samples` samples of an open source.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the source fails
/// fatally. Unreadable samples and early exhaustion appear as anomalies in
/// the report instead.
///
/// # Example
///
/// ```
/// use ml_inspect::{DataSource, FieldValue, InMemoryTable, InspectConfig, SampleRecord, inspect};
///
/// let samples = (0..4)
///     .map(|i| SampleRecord::new().with_field("step", FieldValue::int(i)))
///     .collect();
/// let mut source = DataSource::random_access(InMemoryTable::new(samples));
///
/// let report = inspect(&mut source, &InspectConfig::new(10)).unwrap();
/// assert_eq!(report.samples_inspected, 4);
/// assert_eq!(report.stats["step"].max, vec![3.0]);
/// ```
pub fn inspect(source: &mut DataSource, config: &InspectConfig) -> Result<InspectionReport> {
    let mut inspection = Inspection::new(config.clone())?;
    info!(
        "inspecting up to {} samples ({} probed) from {} source",
        config.num_samples,
        config.probe_size,
        source.kind()
    );

    for item in source.samples(config.num_samples) {
        match item {
            Ok((position, sample)) => inspection.observe(position, &sample)?,
            Err(err) => inspection.record_error(err)?,
        }
    }

    inspection.finish(source.facts(), &source.features())
}

/// Opens the source a descriptor names and inspects it.
///
/// # Errors
///
/// Returns an error if the source cannot be opened or fails fatally.
pub fn inspect_descriptor(
    descriptor: &SourceDescriptor,
    config: &InspectConfig,
) -> Result<InspectionReport> {
    let mut source = DataSource::open(descriptor)?;
    inspect(&mut source, config)
}
