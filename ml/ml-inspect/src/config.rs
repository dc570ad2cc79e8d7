//! Inspection and data source configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InspectError, Result};

/// Environment variable naming the local dataset root.
pub const DATASET_HOME_ENV: &str = "HF_LEROBOT_HOME";

/// Number of task descriptions listed in dataset facts by default.
pub const DEFAULT_TASK_PREVIEW: usize = 10;

/// Configuration for one inspection run.
///
/// # Example
///
/// ```
/// use ml_inspect::InspectConfig;
///
/// let config = InspectConfig::default();
/// assert_eq!(config.num_samples, 10);
/// assert_eq!(config.probe_size, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Maximum number of samples to inspect (N).
    pub num_samples: usize,

    /// Number of leading samples the schema probe looks at (K, at most N).
    pub probe_size: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            num_samples: 10,
            probe_size: 5,
        }
    }
}

impl InspectConfig {
    /// Creates a config inspecting `num_samples` samples.
    ///
    /// The probe size is capped at `num_samples`.
    #[must_use]
    pub const fn new(num_samples: usize) -> Self {
        let probe_size = if num_samples < 5 { num_samples } else { 5 };
        Self {
            num_samples,
            probe_size,
        }
    }

    /// Sets the number of samples.
    #[must_use]
    pub const fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Sets the schema probe size.
    #[must_use]
    pub const fn with_probe_size(mut self, probe_size: usize) -> Self {
        self.probe_size = probe_size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe is larger than the sample window.
    pub fn validate(&self) -> Result<()> {
        if self.probe_size > self.num_samples {
            return Err(InspectError::invalid_config(format!(
                "probe_size ({}) must not exceed num_samples ({})",
                self.probe_size, self.num_samples
            )));
        }
        Ok(())
    }
}

/// Which access model a data source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Indexable table of known length.
    #[default]
    RandomAccess,

    /// Sequential batch stream of unknown length.
    Streaming,
}

impl SourceKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RandomAccess => "random_access",
            Self::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identifies a dataset and how to open it.
///
/// For random-access sources the identifier is a repository id resolved
/// under the dataset root. For streaming sources it is a path to a batch
/// file or directory, absolute or relative to the root.
///
/// # Example
///
/// ```
/// use ml_inspect::{SourceDescriptor, SourceKind};
///
/// let descriptor = SourceDescriptor::random_access("lerobot/pusht")
///     .with_root("/data/lerobot");
/// assert_eq!(descriptor.kind, SourceKind::RandomAccess);
/// assert_eq!(
///     descriptor.dataset_root(),
///     std::path::PathBuf::from("/data/lerobot"),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Dataset identifier.
    pub identifier: String,

    /// Access model.
    #[serde(default)]
    pub kind: SourceKind,

    /// Dataset root directory; see [`SourceDescriptor::dataset_root`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Expected number of samples, when known ahead of time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_hint: Option<usize>,

    /// Expected samples per batch for streaming sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Number of task descriptions listed in dataset facts.
    #[serde(default = "default_task_preview")]
    pub task_preview: usize,
}

const fn default_task_preview() -> usize {
    DEFAULT_TASK_PREVIEW
}

impl SourceDescriptor {
    /// Creates a descriptor for an episodic table.
    #[must_use]
    pub fn random_access(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: SourceKind::RandomAccess,
            root: None,
            size_hint: None,
            batch_size: None,
            task_preview: DEFAULT_TASK_PREVIEW,
        }
    }

    /// Creates a descriptor for a batch stream.
    #[must_use]
    pub fn streaming(identifier: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Streaming,
            ..Self::random_access(identifier)
        }
    }

    /// Sets the dataset root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Sets the size hint.
    #[must_use]
    pub const fn with_size_hint(mut self, size_hint: usize) -> Self {
        self.size_hint = Some(size_hint);
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Loads a descriptor from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(InspectError::from)
    }

    /// Returns the dataset root.
    ///
    /// Resolution order: the descriptor's `root`, then `$HF_LEROBOT_HOME`,
    /// then `$HF_HOME/lerobot`, then `$HOME/.cache/huggingface/lerobot`,
    /// then the current directory.
    #[must_use]
    pub fn dataset_root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return root.clone();
        }
        if let Some(home) = std::env::var_os(DATASET_HOME_ENV) {
            return PathBuf::from(home);
        }
        if let Some(hf_home) = std::env::var_os("HF_HOME") {
            return PathBuf::from(hf_home).join("lerobot");
        }
        std::env::var_os("HOME").map_or_else(
            || PathBuf::from("."),
            |home| {
                PathBuf::from(home)
                    .join(".cache")
                    .join("huggingface")
                    .join("lerobot")
            },
        )
    }

    /// Resolves the identifier to a path under the dataset root.
    ///
    /// Absolute identifiers are used as-is.
    #[must_use]
    pub fn resolve_path(&self) -> PathBuf {
        let identifier = Path::new(&self.identifier);
        if identifier.is_absolute() {
            identifier.to_path_buf()
        } else {
            self.dataset_root().join(identifier)
        }
    }
}
