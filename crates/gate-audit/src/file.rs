//! Append-only JSON lines audit logger

use crate::record::{AuditRecord, DecisionRecord, SystemErrorRecord};
use async_trait::async_trait;
use gate_core::{AuditLogger, Decision, FactMap, GateError, GateResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Writes one JSON object per line; never rewrites earlier lines
pub struct JsonFileAuditLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileAuditLogger {
    /// Create the logger, creating parent directories as needed
    pub async fn new(path: impl Into<PathBuf>) -> GateResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| audit_error(&path, e))?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the file
    pub async fn read_all(&self) -> GateResult<Vec<AuditRecord>> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(audit_error(&self.path, e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| audit_error(&self.path, e))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord =
                serde_json::from_str(&line).map_err(|e| audit_error(&self.path, e))?;
            records.push(record);
        }

        Ok(records)
    }

    async fn append(&self, record: &AuditRecord) -> GateResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| audit_error(&self.path, e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| audit_error(&self.path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| audit_error(&self.path, e))?;
        file.flush().await.map_err(|e| audit_error(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl AuditLogger for JsonFileAuditLogger {
    async fn log_decision(
        &self,
        facts: &FactMap,
        decision: &Decision,
        policy_id: &str,
        config_id: &str,
        eval_duration: Duration,
    ) -> GateResult<()> {
        let record = DecisionRecord::new(facts, decision, policy_id, config_id, eval_duration);
        self.append(&AuditRecord::Decision(record)).await
    }

    async fn log_system_error(
        &self,
        err: &GateError,
        deployment_id: &str,
        stage: &str,
        policy_id: &str,
        config_id: &str,
    ) -> GateResult<()> {
        let record = SystemErrorRecord::new(err, deployment_id, stage, policy_id, config_id);
        self.append(&AuditRecord::SystemError(record)).await
    }
}

fn audit_error(path: &Path, err: impl std::fmt::Display) -> GateError {
    GateError::Audit(format!("{}: {}", path.display(), err))
}
