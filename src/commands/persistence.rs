//! Command persistence backends
//!
//! Repositories only move `SavedCommand` lists in and out of storage; the
//! store decides what gets saved and how the reloaded table is installed.
//!
//! - [`MemoryRepository`]: process-local, used by default and in tests
//! - [`JsonFileRepository`]: versioned pretty JSON file
//! - [`SledRepository`]: embedded sled database, one key holding the list

use crate::model::SavedCommand;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, trace};

/// Key under which the command list lives in sled
const DATA_KEY: &[u8] = b"commands";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed command data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("unsupported command file version: {0}")]
    UnsupportedVersion(String),
}

/// Storage collaborator of the command store
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// Backend name for logging (e.g. "json", "sled")
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError>;

    async fn save(&self, commands: &[SavedCommand]) -> Result<(), PersistenceError>;
}

/// Keeps saved commands in memory for the lifetime of the process
#[derive(Default)]
pub struct MemoryRepository {
    commands: Mutex<Vec<SavedCommand>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commands(commands: Vec<SavedCommand>) -> Self {
        Self {
            commands: Mutex::new(commands),
        }
    }

    pub fn snapshot(&self) -> Vec<SavedCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl CommandRepository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError> {
        Ok(self.commands.lock().clone())
    }

    async fn save(&self, commands: &[SavedCommand]) -> Result<(), PersistenceError> {
        *self.commands.lock() = commands.to_vec();
        Ok(())
    }
}

/// On-disk JSON envelope
#[derive(Debug, Serialize, Deserialize)]
struct CommandsFile {
    version: String,
    saved_at: DateTime<Utc>,
    commands: Vec<SavedCommand>,
}

impl CommandsFile {
    const VERSION: &'static str = "1.0.0";
}

/// Stores commands as a pretty-printed JSON file
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommandRepository for JsonFileRepository {
    fn name(&self) -> &str {
        "json"
    }

    async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No command file at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: CommandsFile = serde_json::from_str(&json)?;
        if file.version != CommandsFile::VERSION {
            return Err(PersistenceError::UnsupportedVersion(file.version));
        }

        debug!(
            "Command file loaded (version: {}, saved at: {}, {} commands)",
            file.version,
            file.saved_at,
            file.commands.len()
        );
        Ok(file.commands)
    }

    async fn save(&self, commands: &[SavedCommand]) -> Result<(), PersistenceError> {
        let file = CommandsFile {
            version: CommandsFile::VERSION.to_string(),
            saved_at: Utc::now(),
            commands: commands.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Previous file stays intact until the new one is fully written
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        info!(
            "Saved {} commands to {}",
            commands.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Stores commands in an embedded sled database
pub struct SledRepository {
    db: sled::Db,
}

impl SledRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db = sled::open(path.as_ref())?;
        info!("Command database opened at: {}", path.as_ref().display());
        Ok(Self { db })
    }
}

#[async_trait]
impl CommandRepository for SledRepository {
    fn name(&self) -> &str {
        "sled"
    }

    async fn load(&self) -> Result<Vec<SavedCommand>, PersistenceError> {
        let db = self.db.clone();
        let raw = tokio::task::spawn_blocking(move || db.get(DATA_KEY)).await??;

        match raw {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                trace!("No commands stored in sled yet");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, commands: &[SavedCommand]) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(commands)?;
        let db = self.db.clone();

        // sled I/O is blocking; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            db.insert(DATA_KEY, json)?;
            db.flush()?;
            Ok::<_, sled::Error>(())
        })
        .await??;

        trace!("Flushed {} commands to sled", commands.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ActionKind, AxisName, AxisSubtype, ButtonNumber, ButtonSubtype,
    };
    use tempfile::TempDir;

    fn saved(id: &str) -> SavedCommand {
        SavedCommand {
            id: id.to_string(),
            name: "Throttle".to_string(),
            device: "Controller-X".to_string(),
            event: "Ctrl 7".to_string(),
            trigger_low: 0,
            trigger_high: 127,
            value_min: 0,
            value_max: 127,
            device_id: 2,
            kind: ActionKind::Axis,
            axis_name: AxisName::Throttle,
            axis_subtype: AxisSubtype::Absolute,
            button_number: ButtonNumber::new(1).unwrap(),
            button_subtype: ButtonSubtype::Press,
        }
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested").join("commands.json"));

        let commands = vec![saved("a"), saved("b")];
        repo.save(&commands).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), commands);
    }

    #[tokio::test]
    async fn test_json_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("absent.json"));
        assert!(repo.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commands.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let repo = JsonFileRepository::new(path);
        assert!(matches!(repo.load().await, Err(PersistenceError::Json(_))));
    }

    #[tokio::test]
    async fn test_sled_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = SledRepository::open(dir.path().join("commands.sled")).unwrap();

        assert!(repo.load().await.unwrap().is_empty());

        let commands = vec![saved("x")];
        repo.save(&commands).await.unwrap();
        assert_eq!(repo.load().await.unwrap(), commands);
    }
}
