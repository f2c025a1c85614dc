//! File-backed policy provider

use crate::bundle::{policy_sha, CompiledPolicyBundle};
use async_trait::async_trait;
use gate_config::PolicyReload;
use gate_core::{GateError, GateResult, PolicyBundle, PolicyProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct Loaded {
    bundle: Arc<CompiledPolicyBundle>,
    mtime: Option<SystemTime>,
}

/// Loads, compiles and caches a policy bundle from a file
///
/// With [`PolicyReload::Once`] the first successful load is reused for the
/// lifetime of the provider and the file is never examined again. With
/// [`PolicyReload::OnChange`] the file is re-stat'ed on every call and
/// rebuilt when its modification time differs; if the bytes are unchanged
/// the cached bundle is kept. Concurrent callers are serialised so a
/// bundle is compiled at most once per change.
pub struct FilePolicyProvider {
    path: PathBuf,
    query: String,
    reload: PolicyReload,
    state: Mutex<Option<Loaded>>,
}

impl FilePolicyProvider {
    pub fn new(path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
            reload: PolicyReload::Once,
            state: Mutex::new(None),
        }
    }

    pub fn with_reload(mut self, reload: PolicyReload) -> Self {
        self.reload = reload;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current bundle with its concrete type
    pub async fn load(&self) -> GateResult<Arc<CompiledPolicyBundle>> {
        let mut state = self.state.lock().await;

        let mtime = match self.reload {
            PolicyReload::Once => {
                if let Some(loaded) = state.as_ref() {
                    return Ok(loaded.bundle.clone());
                }
                None
            }
            PolicyReload::OnChange => {
                let mtime = self.modified().await?;
                if let Some(loaded) = state.as_ref() {
                    if loaded.mtime == Some(mtime) {
                        return Ok(loaded.bundle.clone());
                    }
                }
                Some(mtime)
            }
        };

        let source = tokio::fs::read(&self.path).await.map_err(|e| {
            GateError::PolicyLoad(format!("reading policy file {}: {}", self.path.display(), e))
        })?;

        if let Some(loaded) = state.as_mut() {
            if loaded.bundle.id() == policy_sha(&source) {
                debug!(path = %self.path.display(), "Policy file touched but unchanged");
                loaded.mtime = mtime;
                return Ok(loaded.bundle.clone());
            }
        }

        let bundle = match CompiledPolicyBundle::from_source(&source, &self.query) {
            Ok(bundle) => Arc::new(bundle),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Policy failed to compile");
                return Err(e);
            }
        };

        info!(
            path = %self.path.display(),
            policy_id = %bundle.id(),
            query = %self.query,
            "Loaded policy bundle"
        );

        *state = Some(Loaded {
            bundle: bundle.clone(),
            mtime,
        });
        Ok(bundle)
    }

    async fn modified(&self) -> GateResult<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| {
                GateError::PolicyLoad(format!("stat policy file {}: {}", self.path.display(), e))
            })
    }
}

#[async_trait]
impl PolicyProvider for FilePolicyProvider {
    async fn bundle(&self) -> GateResult<Arc<dyn PolicyBundle>> {
        let bundle: Arc<dyn PolicyBundle> = self.load().await?;
        Ok(bundle)
    }
}
