//! Audit logger that emits structured `tracing` events

use crate::record::{DecisionRecord, SystemErrorRecord};
use async_trait::async_trait;
use gate_core::{AuditLogger, Decision, FactMap, GateError, GateResult};
use std::time::Duration;
use tracing::{error, info};

/// Target of every audit event
pub const AUDIT_TARGET: &str = "gate::audit";

/// Writes audit records as `tracing` events
///
/// Decisions are logged at `INFO`, system errors at `ERROR`. The facts map
/// is rendered as a JSON string field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl TracingAuditLogger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_decision(
        &self,
        facts: &FactMap,
        decision: &Decision,
        policy_id: &str,
        config_id: &str,
        eval_duration: Duration,
    ) -> GateResult<()> {
        let record = DecisionRecord::new(facts, decision, policy_id, config_id, eval_duration);
        let facts_json = serde_json::to_string(&record.facts)
            .map_err(|e| GateError::Audit(format!("serializing facts: {}", e)))?;

        info!(
            target: AUDIT_TARGET,
            audit_id = %record.id,
            policy_id = %record.policy_id,
            config_id = %record.config_id,
            allow = record.allow,
            deny_reasons = ?record.deny_reasons,
            eval_duration_ms = record.eval_duration_ms,
            facts = %facts_json,
            "decision"
        );
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

        error!(
            target: AUDIT_TARGET,
            audit_id = %record.id,
            deployment_id = %record.deployment_id,
            stage = %record.stage,
            policy_id = %record.policy_id,
            config_id = %record.config_id,
            error_kind = %record.error_kind,
            fact_id = record.fact_id.as_deref().unwrap_or(""),
            error = %record.error,
            "system_error"
        );
        Ok(())
    }
}
