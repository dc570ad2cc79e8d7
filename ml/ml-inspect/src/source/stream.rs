//! JSONL batch stream reader.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::{Batch, BatchStream};
use crate::error::{InspectError, Result};
use crate::report::DatasetFacts;

/// Reads batches from a JSONL file or a directory of JSONL files.
///
/// Each non-blank line is one batch object. Files in a directory are read
/// in path order. Files are opened lazily, one at a time.
#[derive(Debug)]
pub struct JsonlBatchStream {
    files: Vec<PathBuf>,
    next_file: usize,
    current: Option<(PathBuf, Lines<BufReader<File>>, usize)>,
}

impl JsonlBatchStream {
    /// Opens a stream over `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::SourceNotFound`] if the path does not exist
    /// or a directory holds no `.jsonl` files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let files = if path.is_file() {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            files.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"));
            files.sort();
            files
        } else {
            return Err(InspectError::source_not_found(format!(
                "batch stream {} does not exist",
                path.display()
            )));
        };

        if files.is_empty() {
            return Err(InspectError::source_not_found(format!(
                "no batch files in {}",
                path.display()
            )));
        }
        debug!("streaming batches from {} files", files.len());

        Ok(Self {
            files,
            next_file: 0,
            current: None,
        })
    }

    fn read_next(&mut self) -> Result<Option<Batch>> {
        loop {
            if let Some((path, lines, lineno)) = &mut self.current {
                for line in lines.by_ref() {
                    *lineno += 1;
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value: Value = serde_json::from_str(&line).map_err(|err| {
                        InspectError::source_read(format!("{}:{lineno}: {err}", path.display()))
                    })?;
                    return Batch::from_json(value)
                        .map(Some)
                        .map_err(|err| {
                            InspectError::source_read(format!("{}:{lineno}: {err}", path.display()))
                        });
                }
                self.current = None;
            }

            let Some(path) = self.files.get(self.next_file).cloned() else {
                return Ok(None);
            };
            self.next_file += 1;
            let lines = BufReader::new(File::open(&path)?).lines();
            self.current = Some((path, lines, 0));
        }
    }
}

impl BatchStream for JsonlBatchStream {
    fn next_batch(&mut self) -> Option<Result<Batch>> {
        self.read_next().transpose()
    }

    fn facts(&self) -> DatasetFacts {
        DatasetFacts::new().with("batch_files", self.files.len())
    }
}
