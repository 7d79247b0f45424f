// ABOUTME: ReplicationState - per-stream bookmarks persisted between runs
// ABOUTME: Loaded at start, mutated in place, flushed through a StateStore at checkpoints

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::sink::MessageWriter;

/// High-water marks keyed by stream name, then by replication key name.
///
/// Serializes as `{"bookmarks": {"<stream>": {"<key>": "<value>"}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationState {
    #[serde(default)]
    pub bookmarks: BTreeMap<String, BTreeMap<String, String>>,
}

impl ReplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last committed value for a stream's replication key.
    pub fn get(&self, stream: &str, key: &str) -> Option<&str> {
        self.bookmarks
            .get(stream)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    /// Record a bookmark value.
    ///
    /// Overwrites unconditionally: callers commit values in scan order, so the
    /// stored value only moves forward when they do.
    pub fn set(&mut self, stream: &str, key: &str, value: impl Into<String>) -> &mut Self {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Load state from a JSON file. A missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replication state from {:?}", path))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: ReplicationState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse replication state from {:?}", path))?;
        Ok(state)
    }
}

/// Durable destination for replication state.
///
/// `persist` writes the whole document each time and may be called after
/// every committed window.
pub trait StateStore {
    fn persist(&mut self, state: &ReplicationState) -> Result<()>;
}

/// Writes the state document to a file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn persist(&mut self, state: &ReplicationState) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;

        // Temp file in the same directory so the rename stays on one filesystem
        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temp state file in {:?}", parent))?;
        serde_json::to_writer_pretty(&mut temp, state)
            .context("Failed to serialize replication state")?;
        temp.as_file_mut()
            .sync_all()
            .context("Failed to flush replication state")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to write replication state to {:?}", self.path))?;

        tracing::debug!("Persisted replication state to {:?}", self.path);
        Ok(())
    }
}

/// Emits the state document as a STATE message on the output stream.
pub struct StateMessageStore<W: Write> {
    writer: MessageWriter<W>,
}

impl<W: Write> StateMessageStore<W> {
    pub fn new(output: W) -> Self {
        Self {
            writer: MessageWriter::new(output),
        }
    }
}

impl StateMessageStore<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> StateStore for StateMessageStore<W> {
    fn persist(&mut self, state: &ReplicationState) -> Result<()> {
        self.writer.write_state(state)
    }
}
