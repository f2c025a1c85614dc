//! Audit record shape

use chrono::{DateTime, Utc};
use gate_core::{Decision, ErrorKind, FactMap, GateError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One audit entry: a decision or a cycle that failed before deciding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Decision(DecisionRecord),
    SystemError(SystemErrorRecord),
}

impl AuditRecord {
    pub fn id(&self) -> Uuid {
        match self {
            AuditRecord::Decision(r) => r.id,
            AuditRecord::SystemError(r) => r.id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditRecord::Decision(r) => r.timestamp,
            AuditRecord::SystemError(r) => r.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub policy_id: String,
    pub config_id: String,
    /// Facts the decision was made on
    pub facts: FactMap,
    pub allow: bool,
    pub deny_reasons: Vec<String>,
    pub eval_duration_ms: u64,
}

impl DecisionRecord {
    pub fn new(
        facts: &FactMap,
        decision: &Decision,
        policy_id: &str,
        config_id: &str,
        eval_duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            policy_id: policy_id.to_string(),
            config_id: config_id.to_string(),
            facts: facts.clone(),
            allow: decision.allow,
            deny_reasons: decision.deny_reasons.clone(),
            eval_duration_ms: eval_duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub deployment_id: String,
    pub stage: String,
    /// Empty when the failure happened before a policy was loaded
    pub policy_id: String,
    pub config_id: String,
    pub error_kind: ErrorKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
}

impl SystemErrorRecord {
    pub fn new(
        err: &GateError,
        deployment_id: &str,
        stage: &str,
        policy_id: &str,
        config_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            deployment_id: deployment_id.to_string(),
            stage: stage.to_string(),
            policy_id: policy_id.to_string(),
            config_id: config_id.to_string(),
            error_kind: err.kind(),
            error: err.to_string(),
            fact_id: err.fact_id().map(str::to_string),
        }
    }
}
