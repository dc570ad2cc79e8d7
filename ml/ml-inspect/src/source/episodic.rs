//! Episodic table stored on local disk.
//!
//! Layout under the dataset directory:
//!
//! ```text
//! meta/info.json      dataset facts and declared features
//! meta/tasks.jsonl    optional task descriptions, one object per line
//! data/**/*.jsonl     frames, one JSON object per line
//! ```
//!
//! Opening indexes the byte offset of every frame line; frames are read on
//! demand by seeking into the shard that holds them.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::RandomAccessSource;
use crate::config::DEFAULT_TASK_PREVIEW;
use crate::error::{InspectError, Result};
use crate::features::{FeatureSpec, parse_features};
use crate::report::DatasetFacts;
use crate::sample::SampleRecord;

/// One data file and the offsets of its frame lines.
#[derive(Debug, Clone)]
struct Shard {
    path: PathBuf,
    offsets: Vec<u64>,
}

impl Shard {
    fn index(path: PathBuf) -> Result<Self> {
        let mut reader = BufReader::new(File::open(&path)?);
        let mut offsets = Vec::new();
        let mut offset = 0u64;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                offsets.push(offset);
            }
            offset += read as u64;
        }
        Ok(Self { path, offsets })
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }
}

/// Random-access view over an episodic table directory.
///
/// # Example
///
/// ```no_run
/// use ml_inspect::{EpisodicTable, RandomAccessSource};
///
/// let mut table = EpisodicTable::open("/data/lerobot/aloha_sim").unwrap();
/// println!("{} frames", table.len());
/// let first = table.read(0).unwrap();
/// println!("{} fields", first.len());
/// ```
#[derive(Debug)]
pub struct EpisodicTable {
    root: PathBuf,
    info: serde_json::Map<String, Value>,
    features: BTreeMap<String, FeatureSpec>,
    tasks: Vec<String>,
    task_preview: usize,
    shards: Vec<Shard>,
    len: usize,
    reader: Option<(usize, BufReader<File>)>,
}

impl EpisodicTable {
    /// Opens the table rooted at `root` and indexes its frames.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::SourceNotFound`] if the directory or its
    /// frames do not exist, or a read error if metadata is malformed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(InspectError::source_not_found(format!(
                "dataset directory {} does not exist",
                root.display()
            )));
        }

        let mut info = read_info(&root.join("meta").join("info.json"))?;
        let features = match info.remove("features") {
            Some(Value::Object(map)) => parse_features(&map),
            Some(other) => {
                warn!("ignoring non-object features declaration: {other}");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        };
        let tasks = read_tasks(&root.join("meta").join("tasks.jsonl"))?;

        let data_dir = root.join("data");
        let mut files = Vec::new();
        if data_dir.is_dir() {
            collect_jsonl(&data_dir, &mut files)?;
        }
        if files.is_empty() {
            return Err(InspectError::source_not_found(format!(
                "no frame files under {}",
                data_dir.display()
            )));
        }
        files.sort();

        let shards = files
            .into_iter()
            .map(Shard::index)
            .collect::<Result<Vec<_>>>()?;
        let len = shards.iter().map(Shard::len).sum();
        debug!(
            "indexed {} frames across {} files in {}",
            len,
            shards.len(),
            root.display()
        );

        Ok(Self {
            root,
            info,
            features,
            tasks,
            task_preview: DEFAULT_TASK_PREVIEW,
            shards,
            len,
            reader: None,
        })
    }

    /// Sets how many task descriptions appear in the facts.
    #[must_use]
    pub const fn with_task_preview(mut self, task_preview: usize) -> Self {
        self.task_preview = task_preview;
        self
    }

    /// Returns the table directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the number of data files.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Maps a global frame index to `(shard, line)`.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut offset = 0;
        for (shard_idx, shard) in self.shards.iter().enumerate() {
            if index < offset + shard.len() {
                return Some((shard_idx, index - offset));
            }
            offset += shard.len();
        }
        None
    }

    fn reader_for(&mut self, shard_idx: usize) -> std::io::Result<&mut BufReader<File>> {
        let cached = matches!(self.reader, Some((idx, _)) if idx == shard_idx);
        if !cached {
            let file = File::open(&self.shards[shard_idx].path)?;
            self.reader = Some((shard_idx, BufReader::new(file)));
        }
        match &mut self.reader {
            Some((_, reader)) => Ok(reader),
            None => Err(std::io::Error::other("frame reader unavailable")),
        }
    }

    /// Reads the raw bytes of one frame line.
    fn read_line_at(&mut self, shard_idx: usize, offset: u64) -> std::io::Result<Vec<u8>> {
        let reader = self.reader_for(shard_idx)?;
        reader.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        Ok(line)
    }
}

impl RandomAccessSource for EpisodicTable {
    fn len(&self) -> usize {
        self.len
    }

    fn read(&mut self, index: usize) -> Result<SampleRecord> {
        let (shard_idx, line_idx) = self.locate(index).ok_or_else(|| {
            InspectError::sample_read(index, format!("index out of range (len {})", self.len))
        })?;
        let offset = self.shards[shard_idx].offsets[line_idx];

        let bytes = self.read_line_at(shard_idx, offset).map_err(|err| {
            // Drop the cached reader so the next frame reopens the file.
            self.reader = None;
            InspectError::sample_read(index, err.to_string())
        })?;
        let line = std::str::from_utf8(&bytes)
            .map_err(|err| InspectError::sample_read(index, format!("invalid UTF-8: {err}")))?;

        SampleRecord::from_json_str(line)
            .map_err(|err| InspectError::sample_read(index, err.to_string()))
    }

    fn facts(&self) -> DatasetFacts {
        let mut facts = DatasetFacts::new();
        for (key, value) in &self.info {
            facts.insert(key.clone(), value.clone());
        }
        facts.insert("path", self.root.display().to_string());
        facts.insert("data_files", self.shards.len());
        if !self.tasks.is_empty() {
            let preview: Vec<Value> = self
                .tasks
                .iter()
                .take(self.task_preview)
                .cloned()
                .map(Value::from)
                .collect();
            facts.insert("tasks", preview);
            facts.insert("total_tasks", self.tasks.len());
        }
        facts
    }

    fn features(&self) -> BTreeMap<String, FeatureSpec> {
        self.features.clone()
    }
}

fn read_info(path: &Path) -> Result<serde_json::Map<String, Value>> {
    if !path.is_file() {
        debug!("no metadata at {}", path.display());
        return Ok(serde_json::Map::new());
    }
    let text = std::fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(InspectError::source_read(format!(
            "{} must hold a JSON object, found {}",
            path.display(),
            crate::sample::json_type_name(&other)
        ))),
    }
}

fn read_tasks(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut tasks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|err| {
            InspectError::source_read(format!("{}:{}: {err}", path.display(), lineno + 1))
        })?;
        match value.get("task").and_then(Value::as_str) {
            Some(task) => tasks.push(task.to_string()),
            None => warn!("{}:{}: entry has no task text", path.display(), lineno + 1),
        }
    }
    Ok(tasks)
}

fn collect_jsonl(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_jsonl(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "jsonl") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::FieldValue;
    use std::fs;

    fn write_table(dir: &Path) {
        fs::create_dir_all(dir.join("meta")).unwrap();
        fs::create_dir_all(dir.join("data/chunk-000")).unwrap();
        fs::write(
            dir.join("meta/info.json"),
            r#"{"fps": 30, "robot_type": "koch", "splits": {"train": "0:3"},
                "features": {"state": {"dtype": "float32", "shape": [2]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.join("meta/tasks.jsonl"),
            "{\"task_index\": 0, \"task\": \"pick\"}\n{\"task_index\": 1, \"task\": \"place\"}\n",
        )
        .unwrap();
        fs::write(
            dir.join("data/chunk-000/episode_000000.jsonl"),
            "{\"state\": [1.0, 2.0]}\n{\"state\": [3.0, 4.0]}\n",
        )
        .unwrap();
        fs::write(
            dir.join("data/chunk-000/episode_000001.jsonl"),
            "{\"state\": [5.0, 6.0]}\n\nnot json\n",
        )
        .unwrap();
    }

    #[test]
    fn open_indexes_frames_across_files() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path());

        let table = EpisodicTable::open(dir.path()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.shard_count(), 2);
        assert_eq!(table.locate(0), Some((0, 0)));
        assert_eq!(table.locate(2), Some((1, 0)));
        assert_eq!(table.locate(4), None);
    }

    #[test]
    fn read_by_seek() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path());

        let mut table = EpisodicTable::open(dir.path()).unwrap();
        let third = table.read(2).unwrap();
        assert_eq!(third.get("state"), Some(&FieldValue::vector(&[5.0, 6.0])));
        let first = table.read(0).unwrap();
        assert_eq!(first.get("state"), Some(&FieldValue::vector(&[1.0, 2.0])));
    }

    #[test]
    fn malformed_frame_is_sample_error() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path());

        let mut table = EpisodicTable::open(dir.path()).unwrap();
        let err = table.read(3).unwrap_err();
        assert!(matches!(err, InspectError::SampleRead { index: 3, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn facts_and_features() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path());

        let table = EpisodicTable::open(dir.path()).unwrap().with_task_preview(1);
        let facts = table.facts();
        assert_eq!(facts.get("fps"), Some(&Value::from(30)));
        assert_eq!(facts.get("tasks"), Some(&serde_json::json!(["pick"])));
        assert_eq!(facts.get("total_tasks"), Some(&Value::from(2)));
        assert_eq!(facts.get("splits"), Some(&serde_json::json!({"train": "0:3"})));
        assert_eq!(
            facts.get("path"),
            Some(&Value::from(dir.path().display().to_string()))
        );
        assert_eq!(facts.get("data_files"), Some(&Value::from(2)));
        assert!(facts.get("features").is_none());

        let features = table.features();
        assert_eq!(features["state"].numeric_shape(), Some(vec![2]));
    }

    #[test]
    fn non_utf8_frame_is_sample_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let mut frames = b"{\"x\": 1.0}\n{\"x\": \"".to_vec();
        frames.extend_from_slice(&[0xff, 0xfe]);
        frames.extend_from_slice(b"\"}\n{\"x\": 3.0}\n");
        fs::write(dir.path().join("data/episode_000000.jsonl"), frames).unwrap();

        let mut table = EpisodicTable::open(dir.path()).unwrap();
        assert_eq!(table.len(), 3);

        let err = table.read(1).unwrap_err();
        assert!(matches!(err, InspectError::SampleRead { index: 1, .. }));
        assert!(!err.is_fatal());
        assert_eq!(
            table.read(2).unwrap().get("x"),
            Some(&FieldValue::float(3.0))
        );
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = EpisodicTable::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, InspectError::SourceNotFound(_)));
    }

    #[test]
    fn missing_frames() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("meta")).unwrap();
        let err = EpisodicTable::open(dir.path()).unwrap_err();
        assert!(matches!(err, InspectError::SourceNotFound(_)));
    }
}
