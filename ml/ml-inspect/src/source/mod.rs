//! Data source adapters.
//!
//! Two access models produce [`SampleRecord`]s:
//!
//! - [`RandomAccessSource`]: known length, indexable (episodic tables)
//! - [`BatchStream`]: sequential batches of unknown count (data pipelines)
//!
//! [`DataSource`] wraps either and exposes one capability,
//! [`DataSource::samples`]: a lazy, finite iterator over at most N samples.

mod episodic;
mod memory;
mod stream;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::config::{SourceDescriptor, SourceKind};
use crate::error::{InspectError, Result};
use crate::features::FeatureSpec;
use crate::report::DatasetFacts;
use crate::sample::{SampleRecord, json_type_name};

pub use episodic::EpisodicTable;
pub use memory::{InMemoryTable, IterBatchStream};
pub use stream::JsonlBatchStream;

/// An indexable dataset of known length.
pub trait RandomAccessSource {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Returns `true` if the source has no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the sample at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample cannot be read or decoded.
    fn read(&mut self, index: usize) -> Result<SampleRecord>;

    /// Dataset-level facts.
    fn facts(&self) -> DatasetFacts {
        DatasetFacts::new()
    }

    /// Declared feature types, if the dataset publishes any.
    fn features(&self) -> BTreeMap<String, FeatureSpec> {
        BTreeMap::new()
    }
}

/// A sequential source of sample batches.
pub trait BatchStream {
    /// Produces the next batch, `None` once the stream ends.
    fn next_batch(&mut self) -> Option<Result<Batch>>;

    /// Dataset-level facts.
    fn facts(&self) -> DatasetFacts {
        DatasetFacts::new()
    }
}

/// One batch of samples in columnar form.
///
/// Each column holds one entry per sample along its leading dimension.
/// Columns that are not arrays apply to every sample of the batch.
///
/// # Example
///
/// ```
/// use ml_inspect::Batch;
/// use serde_json::json;
///
/// let batch = Batch::from_json(json!({
///     "state": [[1.0, 2.0], [3.0, 4.0]],
///     "prompt": "pick up the cube",
/// })).unwrap();
///
/// assert_eq!(batch.len(), 2);
/// assert!(batch.record(1).contains("prompt"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    columns: BTreeMap<String, Value>,
    len: usize,
}

impl Batch {
    /// Creates a batch from columns.
    #[must_use]
    pub fn new(columns: BTreeMap<String, Value>) -> Self {
        let len = columns
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .max()
            .unwrap_or(usize::from(!columns.is_empty()));
        Self { columns, len }
    }

    /// Creates a batch from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(map.into_iter().collect())),
            other => Err(InspectError::source_read(format!(
                "batch must be a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Number of samples in the batch.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the batch holds no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extracts the sample at `row`.
    ///
    /// A column shorter than the batch is absent from its trailing rows.
    #[must_use]
    pub fn record(&self, row: usize) -> SampleRecord {
        let mut record = SampleRecord::new();
        for (name, column) in &self.columns {
            let value = match column {
                Value::Array(items) => match items.get(row) {
                    Some(item) => item,
                    None => continue,
                },
                scalar => scalar,
            };
            record.insert(name.clone(), crate::value::FieldValue::from_json(value));
        }
        record
    }
}

struct StreamState {
    stream: Box<dyn BatchStream>,
    pending: Option<(Batch, usize)>,
}

enum Inner {
    RandomAccess(Box<dyn RandomAccessSource>),
    Streaming(StreamState),
}

/// A dataset opened for inspection, in either access model.
///
/// The source owns its handles and releases them when dropped.
pub struct DataSource {
    inner: Inner,
    facts: DatasetFacts,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl DataSource {
    /// Wraps a random-access source.
    #[must_use]
    pub fn random_access(source: impl RandomAccessSource + 'static) -> Self {
        Self {
            inner: Inner::RandomAccess(Box::new(source)),
            facts: DatasetFacts::new(),
        }
    }

    /// Wraps a batch stream.
    #[must_use]
    pub fn streaming(stream: impl BatchStream + 'static) -> Self {
        Self {
            inner: Inner::Streaming(StreamState {
                stream: Box::new(stream),
                pending: None,
            }),
            facts: DatasetFacts::new(),
        }
    }

    /// Opens the source a descriptor points to.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::SourceNotFound`] if the identifier does not
    /// resolve to an existing dataset.
    pub fn open(descriptor: &SourceDescriptor) -> Result<Self> {
        let path = descriptor.resolve_path();
        debug!(
            "opening {} source '{}' at {}",
            descriptor.kind,
            descriptor.identifier,
            path.display()
        );

        let mut source = match descriptor.kind {
            SourceKind::RandomAccess => Self::random_access(
                EpisodicTable::open(&path)?.with_task_preview(descriptor.task_preview),
            ),
            SourceKind::Streaming => Self::streaming(JsonlBatchStream::open(&path)?),
        };

        source.facts.insert("identifier", descriptor.identifier.clone());
        if let Some(hint) = descriptor.size_hint {
            source.facts.insert("size_hint", hint);
        }
        if let Some(batch_size) = descriptor.batch_size {
            source.facts.insert("batch_size", batch_size);
        }
        Ok(source)
    }

    /// Returns the access model.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self.inner {
            Inner::RandomAccess(_) => SourceKind::RandomAccess,
            Inner::Streaming(_) => SourceKind::Streaming,
        }
    }

    /// Returns the number of samples, if known.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match &self.inner {
            Inner::RandomAccess(source) => Some(source.len()),
            Inner::Streaming(_) => None,
        }
    }

    /// Returns the dataset facts.
    #[must_use]
    pub fn facts(&self) -> DatasetFacts {
        let mut facts = match &self.inner {
            Inner::RandomAccess(source) => source.facts(),
            Inner::Streaming(state) => state.stream.facts(),
        };
        facts.insert("source", self.kind().name());
        if let Some(len) = self.len() {
            facts.insert("length", len);
        }
        facts.extend(self.facts.clone());
        facts
    }

    /// Returns the declared feature types.
    #[must_use]
    pub fn features(&self) -> BTreeMap<String, FeatureSpec> {
        match &self.inner {
            Inner::RandomAccess(source) => source.features(),
            Inner::Streaming(_) => BTreeMap::new(),
        }
    }

    /// Produces up to `limit` samples in order.
    ///
    /// Random-access sources always start from index 0. Streaming sources
    /// continue where the previous call stopped and never re-read a sample.
    /// Items are `(position, sample)` pairs; the iterator may be dropped at
    /// any point.
    pub fn samples(&mut self, limit: usize) -> Samples<'_> {
        let cursor = match &mut self.inner {
            Inner::RandomAccess(source) => {
                let end = limit.min(source.len());
                Cursor::RandomAccess {
                    source,
                    next: 0,
                    end,
                }
            }
            Inner::Streaming(state) => Cursor::Streaming {
                state,
                produced: 0,
                batches: 0,
                limit,
            },
        };
        Samples {
            cursor,
            done: false,
        }
    }
}

enum Cursor<'a> {
    RandomAccess {
        source: &'a mut Box<dyn RandomAccessSource>,
        next: usize,
        end: usize,
    },
    Streaming {
        state: &'a mut StreamState,
        produced: usize,
        batches: usize,
        limit: usize,
    },
}

/// Lazy sample iterator returned by [`DataSource::samples`].
///
/// Yields `Ok((position, sample))` for each sample. Errors are yielded in
/// place: [`InspectError::SampleRead`] for a single undecodable sample,
/// [`InspectError::SourceExhausted`] once when a stream ends early, and a
/// fatal error after which the iterator stops.
pub struct Samples<'a> {
    cursor: Cursor<'a>,
    done: bool,
}

impl Iterator for Samples<'_> {
    type Item = Result<(usize, SampleRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match &mut self.cursor {
            Cursor::RandomAccess { source, next, end } => {
                if *next >= *end {
                    self.done = true;
                    return None;
                }
                let index = *next;
                *next += 1;
                Some(match source.read(index) {
                    Ok(record) => Ok((index, record)),
                    Err(err @ InspectError::SampleRead { .. }) => Err(err),
                    Err(err) if err.is_fatal() => {
                        self.done = true;
                        Err(err)
                    }
                    Err(err) => Err(InspectError::sample_read(index, err.to_string())),
                })
            }
            Cursor::Streaming {
                state,
                produced,
                batches,
                limit,
            } => {
                if *produced >= *limit {
                    self.done = true;
                    return None;
                }
                loop {
                    if let Some((batch, row)) = &mut state.pending {
                        if *row < batch.len() {
                            let record = batch.record(*row);
                            *row += 1;
                            let position = *produced;
                            *produced += 1;
                            return Some(Ok((position, record)));
                        }
                        state.pending = None;
                    }

                    if *batches >= *limit {
                        self.done = true;
                        return Some(Err(InspectError::source_exhausted(*limit, *produced)));
                    }
                    match state.stream.next_batch() {
                        Some(Ok(batch)) => {
                            *batches += 1;
                            debug!("batch {} holds {} samples", *batches, batch.len());
                            state.pending = Some((batch, 0));
                        }
                        Some(Err(err)) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                        None => {
                            self.done = true;
                            return Some(Err(InspectError::source_exhausted(*limit, *produced)));
                        }
                    }
                }
            }
        }
    }
}
