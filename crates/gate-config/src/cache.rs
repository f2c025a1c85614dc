//! Configuration snapshot cache
//!
//! A snapshot pairs a parsed [`GateConfig`] with the SHA-256 of the bytes it
//! was parsed from. The cache holds one snapshot and only re-reads the file
//! when its modification time differs from the cached one. Readers never
//! observe a partially built snapshot: the slot is replaced as a whole.

use crate::config::GateConfig;
use gate_core::{GateError, GateResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Parsed configuration plus the metadata it was loaded with
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub config: GateConfig,

    /// Lowercase hex SHA-256 of the source bytes
    pub sha: String,

    /// Modification time of the source file, if file-backed
    pub mtime: Option<SystemTime>,

    /// Source file, if file-backed
    pub path: Option<PathBuf>,
}

impl ConfigSnapshot {
    /// Snapshot of an in-memory configuration, hashed over its JSON form
    pub fn from_config(config: GateConfig) -> GateResult<Self> {
        let canonical = serde_json::to_vec(&config)
            .map_err(|e| GateError::ConfigLoad(format!("serializing configuration: {}", e)))?;
        Ok(Self {
            config,
            sha: sha256_hex(&canonical),
            mtime: None,
            path: None,
        })
    }
}

/// Single-slot, mtime-validated configuration cache
#[derive(Debug, Default)]
pub struct ConfigCache {
    slot: RwLock<Option<Arc<ConfigSnapshot>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for `path`, reloading only if the file changed
    pub async fn load(&self, path: impl AsRef<Path>) -> GateResult<Arc<ConfigSnapshot>> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, "stat", e))?;
        let mtime = metadata
            .modified()
            .map_err(|e| load_error(path, "stat", e))?;

        if let Some(cached) = self.current() {
            if cached.path.as_deref() == Some(path) && cached.mtime == Some(mtime) {
                return Ok(cached);
            }
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| load_error(path, "read", e))?;
        let config: GateConfig = serde_yaml::from_slice(&bytes)
            .map_err(|e| load_error(path, "parse", e))?;

        let snapshot = Arc::new(ConfigSnapshot {
            config,
            sha: sha256_hex(&bytes),
            mtime: Some(mtime),
            path: Some(path.to_path_buf()),
        });

        info!(path = %path.display(), sha = %snapshot.sha, "Loaded configuration");
        *self.slot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Most recently loaded snapshot
    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.slot.read().clone()
    }

    /// Drop the cached snapshot so the next load re-reads the file
    pub fn invalidate(&self) {
        debug!("Invalidating configuration cache");
        *self.slot.write() = None;
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn load_error(path: &Path, action: &str, err: impl std::fmt::Display) -> GateError {
    GateError::ConfigLoad(format!("{} {}: {}", action, path.display(), err))
}
