//! Persisted instance list
//!
//! The foreground driver is the only caller, so writes are serialized by
//! construction.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::record::InstanceRecord;

/// Loads and saves the ordered instance list
pub trait SessionStore: Send + Sync {
    /// Load every persisted record in order; an absent store is empty
    ///
    /// # Errors
    /// Returns error if the store exists but cannot be read or parsed
    fn load(&self) -> Result<Vec<InstanceRecord>>;

    /// Replace the persisted list
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    fn save(&self, records: &[InstanceRecord]) -> Result<()>;
}

/// Pretty JSON array in one file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sessions.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self) -> Result<Vec<InstanceRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, records: &[InstanceRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = std::fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, records)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        log::trace!("Saved {} instances to {}", records.len(), self.path.display());
        Ok(())
    }
}
