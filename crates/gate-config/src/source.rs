//! Configuration sources

use crate::cache::{ConfigCache, ConfigSnapshot};
use crate::config::GateConfig;
use async_trait::async_trait;
use gate_core::GateResult;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supplies the configuration snapshot currently in effect
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn snapshot(&self) -> GateResult<Arc<ConfigSnapshot>>;
}

/// File-backed source, re-validated through a shared cache on every call
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    cache: Arc<ConfigCache>,
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_cache(Arc::new(ConfigCache::new()), path)
    }

    /// Share an existing cache, e.g. with the process that loaded the config
    pub fn with_cache(cache: Arc<ConfigCache>, path: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn snapshot(&self) -> GateResult<Arc<ConfigSnapshot>> {
        self.cache.load(&self.path).await
    }
}

/// In-memory source; `update` swaps the configuration atomically
#[derive(Debug)]
pub struct StaticConfigSource {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl StaticConfigSource {
    pub fn new(config: GateConfig) -> GateResult<Self> {
        Ok(Self {
            current: RwLock::new(Arc::new(ConfigSnapshot::from_config(config)?)),
        })
    }

    /// Replace the configuration; subsequent snapshots see the new value
    pub fn update(&self, config: GateConfig) -> GateResult<()> {
        let snapshot = Arc::new(ConfigSnapshot::from_config(config)?);
        *self.current.write() = snapshot;
        Ok(())
    }

    pub fn config(&self) -> GateConfig {
        self.current.read().config.clone()
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn snapshot(&self) -> GateResult<Arc<ConfigSnapshot>> {
        Ok(self.current.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_source_update() {
        let source = StaticConfigSource::new(GateConfig::default()).unwrap();
        let before = source.snapshot().await.unwrap();
        assert_eq!(before.config.fact_providers.max_pending_allowed, 500);

        let mut config = source.config();
        config.fact_providers.max_pending_allowed = 750;
        source.update(config).unwrap();

        let after = source.snapshot().await.unwrap();
        assert_eq!(after.config.fact_providers.max_pending_allowed, 750);
        assert_ne!(before.sha, after.sha);
    }

    #[tokio::test]
    async fn test_file_source_reads_through_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.yaml");
        std::fs::write(&path, "fact_providers:\n  max_pending_allowed: 321\n").unwrap();

        let cache = Arc::new(ConfigCache::new());
        let source = FileConfigSource::with_cache(cache.clone(), &path);

        let snapshot = source.snapshot().await.unwrap();
        assert_eq!(snapshot.config.fact_providers.max_pending_allowed, 321);
        assert!(Arc::ptr_eq(&cache.current().unwrap(), &snapshot));
        assert_eq!(source.path(), path.as_path());
    }
}
