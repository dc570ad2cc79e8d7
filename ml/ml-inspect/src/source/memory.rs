//! In-memory sources.

use std::collections::{BTreeMap, BTreeSet};

use super::{Batch, BatchStream, RandomAccessSource};
use crate::error::{InspectError, Result};
use crate::features::FeatureSpec;
use crate::report::DatasetFacts;
use crate::sample::SampleRecord;

/// A random-access source backed by a vector of samples.
///
/// # Example
///
/// ```
/// use ml_inspect::{FieldValue, InMemoryTable, RandomAccessSource, SampleRecord};
///
/// let mut table = InMemoryTable::new(vec![
///     SampleRecord::new().with_field("x", FieldValue::float(1.0)),
/// ]);
/// assert_eq!(table.len(), 1);
/// assert!(table.read(0).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryTable {
    samples: Vec<SampleRecord>,
    unreadable: BTreeSet<usize>,
    facts: DatasetFacts,
    features: BTreeMap<String, FeatureSpec>,
}

impl InMemoryTable {
    /// Creates a table over `samples`.
    #[must_use]
    pub fn new(samples: Vec<SampleRecord>) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }

    /// Marks a sample as undecodable.
    #[must_use]
    pub fn with_unreadable(mut self, index: usize) -> Self {
        self.unreadable.insert(index);
        self
    }

    /// Sets the dataset facts.
    #[must_use]
    pub fn with_facts(mut self, facts: DatasetFacts) -> Self {
        self.facts = facts;
        self
    }

    /// Declares a feature.
    #[must_use]
    pub fn with_feature(mut self, name: impl Into<String>, spec: FeatureSpec) -> Self {
        self.features.insert(name.into(), spec);
        self
    }
}

impl RandomAccessSource for InMemoryTable {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn read(&mut self, index: usize) -> Result<SampleRecord> {
        if self.unreadable.contains(&index) {
            return Err(InspectError::sample_read(index, "undecodable sample"));
        }
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| InspectError::sample_read(index, "index out of range"))
    }

    fn facts(&self) -> DatasetFacts {
        self.facts.clone()
    }

    fn features(&self) -> BTreeMap<String, FeatureSpec> {
        self.features.clone()
    }
}

/// A batch stream backed by any iterator of batches.
#[derive(Debug)]
pub struct IterBatchStream<I> {
    batches: I,
    facts: DatasetFacts,
}

impl<I> IterBatchStream<I>
where
    I: Iterator<Item = Result<Batch>>,
{
    /// Creates a stream over `batches`.
    pub fn new(batches: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            batches: batches.into_iter(),
            facts: DatasetFacts::new(),
        }
    }

    /// Sets the dataset facts.
    #[must_use]
    pub fn with_facts(mut self, facts: DatasetFacts) -> Self {
        self.facts = facts;
        self
    }
}

impl<I> BatchStream for IterBatchStream<I>
where
    I: Iterator<Item = Result<Batch>>,
{
    fn next_batch(&mut self) -> Option<Result<Batch>> {
        self.batches.next()
    }

    fn facts(&self) -> DatasetFacts {
        self.facts.clone()
    }
}
