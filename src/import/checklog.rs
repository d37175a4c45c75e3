//! Checkpoints written by the checking pass and read by the commit pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::entity::TargetResource;
use crate::import::validation::MessageStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
    /// The row converted to nothing.
    Empty,
    /// The row is left out, for instance because of a missing file.
    Skipped,
}

/// Validated resource of one row, addressed by its 1-based index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub index: usize,
    pub status: CheckStatus,
    pub resource: TargetResource,
    #[serde(default, skip_serializing_if = "MessageStore::is_empty")]
    pub messages: MessageStore,
}

impl Checkpoint {
    pub fn has_error(&self) -> bool {
        self.status == CheckStatus::Error
    }
}

/// Durable store of checkpoints. The commit pass may run in another process than the
/// checking pass, so implementations must survive restarts within one run.
pub trait CheckLog {
    fn store_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), CheckLogError>;

    fn load_checkpoint(&self, index: usize) -> Result<Option<Checkpoint>, CheckLogError>;

    fn purge(&mut self) -> Result<(), CheckLogError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error type for check-log storage
#[derive(Debug)]
pub enum CheckLogError {
    Io(std::io::Error),
    Corrupt { line: usize, reason: String },
    Serialize(serde_json::Error),
}

impl fmt::Display for CheckLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckLogError::Io(err) => write!(f, "Check log I/O error: {}", err),
            CheckLogError::Corrupt { line, reason } => {
                write!(f, "Check log line {} is corrupt: {}", line, reason)
            }
            CheckLogError::Serialize(err) => write!(f, "Failed to serialize checkpoint: {}", err),
        }
    }
}

impl std::error::Error for CheckLogError {}

impl From<std::io::Error> for CheckLogError {
    fn from(err: std::io::Error) -> Self {
        CheckLogError::Io(err)
    }
}

/// Checkpoints kept in memory, for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckLog {
    checkpoints: BTreeMap<usize, Checkpoint>,
}

impl MemoryCheckLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }
}

impl CheckLog for MemoryCheckLog {
    fn store_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), CheckLogError> {
        self.checkpoints.insert(checkpoint.index, checkpoint);
        Ok(())
    }

    fn load_checkpoint(&self, index: usize) -> Result<Option<Checkpoint>, CheckLogError> {
        Ok(self.checkpoints.get(&index).cloned())
    }

    fn purge(&mut self) -> Result<(), CheckLogError> {
        self.checkpoints.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.checkpoints.len()
    }
}

/// Checkpoints appended as NDJSON lines to a file. The last line for an index wins.
#[derive(Debug)]
pub struct JsonlCheckLog {
    path: PathBuf,
    checkpoints: BTreeMap<usize, Checkpoint>,
}

impl JsonlCheckLog {
    /// Open a check log, loading the checkpoints already stored in it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckLogError> {
        let path = path.into();
        let mut checkpoints = BTreeMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let checkpoint: Checkpoint =
                    serde_json::from_str(&line).map_err(|e| CheckLogError::Corrupt {
                        line: line_no + 1,
                        reason: e.to_string(),
                    })?;
                checkpoints.insert(checkpoint.index, checkpoint);
            }
            tracing::debug!(path = %path.display(), checkpoints = checkpoints.len(), "Check log loaded");
        }

        Ok(Self { path, checkpoints })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckLog for JsonlCheckLog {
    fn store_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), CheckLogError> {
        let line = serde_json::to_string(&checkpoint).map_err(CheckLogError::Serialize)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        self.checkpoints.insert(checkpoint.index, checkpoint);
        Ok(())
    }

    fn load_checkpoint(&self, index: usize) -> Result<Option<Checkpoint>, CheckLogError> {
        Ok(self.checkpoints.get(&index).cloned())
    }

    fn purge(&mut self) -> Result<(), CheckLogError> {
        if self.path.exists() {
            fs::write(&self.path, "")?;
        }
        self.checkpoints.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.checkpoints.len()
    }
}
