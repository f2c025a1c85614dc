//! In-memory audit logger

use crate::record::{AuditRecord, DecisionRecord, SystemErrorRecord};
use async_trait::async_trait;
use gate_core::{AuditLogger, Decision, FactMap, GateError, GateResult};
use parking_lot::RwLock;
use std::time::Duration;

/// Keeps every record in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn decisions(&self) -> Vec<DecisionRecord> {
        self.records
            .read()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Decision(d) => Some(d.clone()),
                AuditRecord::SystemError(_) => None,
            })
            .collect()
    }

    pub fn system_errors(&self) -> Vec<SystemErrorRecord> {
        self.records
            .read()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::SystemError(e) => Some(e.clone()),
                AuditRecord::Decision(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLogger {
    async fn log_decision(
        &self,
        facts: &FactMap,
        decision: &Decision,
        policy_id: &str,
        config_id: &str,
        eval_duration: Duration,
    ) -> GateResult<()> {
        let record = DecisionRecord::new(facts, decision, policy_id, config_id, eval_duration);
        self.records.write().push(AuditRecord::Decision(record));
        Ok(())
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
        self.records.write().push(AuditRecord::SystemError(record));
        Ok(())
    }
}
