//! Decision pipeline
//!
//! One cycle is: snapshot facts, obtain the policy bundle, evaluate, stamp
//! the configuration hash, audit. Exactly one audit call is made per cycle:
//! `log_decision` once a [`Decision`] exists, `log_system_error` otherwise.

use crate::audit::AuditLogger;
use crate::decision::Decision;
use crate::engine::PolicyEngine;
use crate::error::{GateError, GateResult};
use crate::metrics::GateMetrics;
use crate::policy::PolicyProvider;
use crate::registry::{FactRegistry, SnapshotOptions};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A request to decide whether a deployment stage may proceed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GateRequest {
    pub deployment_id: String,
    pub stage: String,
    /// Content hash of the configuration in effect, stamped on the decision
    pub config_id: String,
}

impl GateRequest {
    pub fn new(deployment_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            stage: stage.into(),
            config_id: String::new(),
        }
    }

    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = config_id.into();
        self
    }
}

/// Wires registry, policy, engine and audit sink into one decision cycle
pub struct GatePipeline {
    registry: Arc<FactRegistry>,
    policy: Arc<dyn PolicyProvider>,
    engine: Arc<dyn PolicyEngine>,
    audit: Arc<dyn AuditLogger>,
    options: SnapshotOptions,
    metrics: Option<Arc<GateMetrics>>,
}

impl GatePipeline {
    pub fn new(
        registry: Arc<FactRegistry>,
        policy: Arc<dyn PolicyProvider>,
        engine: Arc<dyn PolicyEngine>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            registry,
            policy,
            engine,
            audit,
            options: SnapshotOptions::default(),
            metrics: None,
        }
    }

    /// Snapshot options applied on every cycle
    pub fn with_snapshot_options(mut self, options: SnapshotOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<FactRegistry> {
        &self.registry
    }

    pub fn snapshot_options(&self) -> SnapshotOptions {
        self.options
    }

    /// Run one decision cycle
    ///
    /// Errors are returned unchanged after being recorded with the audit
    /// sink. A failing audit sink never replaces a produced decision.
    #[instrument(skip(self, request), fields(deployment_id = %request.deployment_id, stage = %request.stage))]
    pub async fn evaluate(&self, request: &GateRequest) -> GateResult<Decision> {
        let facts = match self
            .registry
            .snapshot_with_options(&request.deployment_id, &request.stage, self.options)
            .await
        {
            Ok(facts) => facts,
            Err(e) => return Err(self.system_error(e, request, "").await),
        };

        let bundle = match self.policy.bundle().await {
            Ok(bundle) => bundle,
            Err(e) => return Err(self.system_error(e, request, "").await),
        };

        let decision = match self.engine.evaluate(bundle.as_ref(), &facts).await {
            Ok(decision) => decision.with_config_sha(request.config_id.clone()),
            Err(e) => return Err(self.system_error(e, request, bundle.id()).await),
        };

        if let Some(m) = &self.metrics {
            m.record_decision(decision.allow);
        }

        info!(
            allow = decision.allow,
            deny_reasons = ?decision.deny_reasons,
            policy_id = %decision.policy_sha,
            eval_ms = decision.eval_duration.as_millis() as u64,
            "Gate decision"
        );

        if let Err(e) = self
            .audit
            .log_decision(
                &facts,
                &decision,
                bundle.id(),
                &request.config_id,
                decision.eval_duration,
            )
            .await
        {
            warn!(error = %e, "Failed to audit decision");
        }

        Ok(decision)
    }

    async fn system_error(&self, err: GateError, request: &GateRequest, policy_id: &str) -> GateError {
        if let Some(m) = &self.metrics {
            m.record_system_error(err.kind().as_str());
        }

        warn!(
            error = %err,
            error_kind = %err.kind(),
            policy_id = %policy_id,
            "Gate cycle aborted"
        );

        if let Err(audit_err) = self
            .audit
            .log_system_error(
                &err,
                &request.deployment_id,
                &request.stage,
                policy_id,
                &request.config_id,
            )
            .await
        {
            warn!(error = %audit_err, "Failed to audit system error");
        }

        err
    }
}
