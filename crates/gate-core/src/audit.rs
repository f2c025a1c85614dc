//! Audit logging contract

use crate::decision::Decision;
use crate::error::{GateError, GateResult};
use crate::fact::FactMap;
use async_trait::async_trait;
use std::time::Duration;

/// Records every decision and every system failure
///
/// Exactly one of the two methods is called per decision cycle.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Record a completed decision with the facts it was made on
    async fn log_decision(
        &self,
        facts: &FactMap,
        decision: &Decision,
        policy_id: &str,
        config_id: &str,
        eval_duration: Duration,
    ) -> GateResult<()>;

    /// Record a cycle that failed before producing a decision
    ///
    /// `policy_id` is empty when the failure happened before a bundle was
    /// obtained.
    async fn log_system_error(
        &self,
        err: &GateError,
        deployment_id: &str,
        stage: &str,
        policy_id: &str,
        config_id: &str,
    ) -> GateResult<()>;
}
