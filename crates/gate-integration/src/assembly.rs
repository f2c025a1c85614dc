//! Building a gate from configuration

use crate::coverage::{check_provider_coverage, CoverageReport};
use gate_audit::{JsonFileAuditLogger, TracingAuditLogger};
use gate_config::{AuditSinkConfig, ConfigSource, FileConfigSource, GateConfig, StaticConfigSource};
use gate_core::{
    AuditLogger, Decision, FactRegistry, GateError, GateMetrics, GatePipeline, GateRequest,
    GateResult, PolicyBundle,
};
use gate_facts::{ConfigFactProvider, LevelServerProvider};
use gate_policy::{FilePolicyProvider, RulePolicyEngine};
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Fact served by the level server
pub const PENDING_DELTA_FACT: &str = "pending_delta";

/// Fact served from configuration
pub const MAX_PENDING_ALLOWED_FACT: &str = "max_pending_allowed";

/// Builder for [`GateAssembly`]
pub struct GateAssemblyBuilder {
    source: Arc<dyn ConfigSource>,
    audit: Option<Arc<dyn AuditLogger>>,
    metrics_registry: Option<Registry>,
}

impl GateAssemblyBuilder {
    /// Use `audit` instead of the sink named in the configuration
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Register metrics with `registry` instead of a private one
    ///
    /// Building fails with `ConfigLoad` if the registry already holds gate
    /// metrics under the configured prefix.
    pub fn with_metrics_registry(mut self, registry: Registry) -> Self {
        self.metrics_registry = Some(registry);
        self
    }

    /// Read the configuration once and wire every component from it
    pub async fn build(self) -> GateResult<GateAssembly> {
        let snapshot = self.source.snapshot().await?;
        let config = &snapshot.config;

        validate_metrics_prefix(&config.metrics.prefix)?;
        let metrics_registry = self.metrics_registry.unwrap_or_else(Registry::new);
        let metrics = Arc::new(GateMetrics::try_with_prefix(
            &metrics_registry,
            &config.metrics.prefix,
        )?);

        let registry = Arc::new(FactRegistry::new().with_metrics(metrics.clone()));
        registry.register(Arc::new(LevelServerProvider::new(
            PENDING_DELTA_FACT,
            &config.fact_providers.level_server_base_url,
            config.fact_providers.cache_ttl(),
            "Devices currently in the pending state",
        )?));
        registry.register(Arc::new(ConfigFactProvider::max_pending_allowed(
            self.source.clone(),
        )));

        let policy = Arc::new(
            FilePolicyProvider::new(config.policy.path.clone(), config.policy.query.clone())
                .with_reload(config.policy.reload),
        );

        let audit = match self.audit {
            Some(audit) => audit,
            None => audit_sink(&config.audit.sink).await?,
        };

        let pipeline = GatePipeline::new(
            registry.clone(),
            policy.clone(),
            Arc::new(RulePolicyEngine::new()),
            audit.clone(),
        )
        .with_snapshot_options(config.snapshot_options())
        .with_metrics(metrics.clone());

        info!(
            config_id = %snapshot.sha,
            policy_path = %config.policy.path.display(),
            level_server = %config.fact_providers.level_server_base_url,
            providers = registry.len(),
            "Gate assembled"
        );

        Ok(GateAssembly {
            source: self.source,
            registry,
            policy,
            audit,
            metrics,
            metrics_registry,
            pipeline,
        })
    }
}

/// A complete gate: providers, policy, engine, audit and metrics
///
/// Snapshot options and provider settings are fixed when the gate is built.
/// The configuration is still consulted on every decision for its hash and
/// for configuration-backed facts.
pub struct GateAssembly {
    source: Arc<dyn ConfigSource>,
    registry: Arc<FactRegistry>,
    policy: Arc<FilePolicyProvider>,
    audit: Arc<dyn AuditLogger>,
    metrics: Arc<GateMetrics>,
    metrics_registry: Registry,
    pipeline: GatePipeline,
}

impl GateAssembly {
    pub fn builder(source: Arc<dyn ConfigSource>) -> GateAssemblyBuilder {
        GateAssemblyBuilder {
            source,
            audit: None,
            metrics_registry: None,
        }
    }

    /// Gate over a configuration file, re-validated by mtime on every decision
    pub async fn from_file(path: impl Into<PathBuf>) -> GateResult<Self> {
        Self::builder(Arc::new(FileConfigSource::new(path))).build().await
    }

    /// Gate over an in-memory configuration
    pub async fn from_config(config: GateConfig) -> GateResult<Self> {
        Self::builder(Arc::new(StaticConfigSource::new(config)?))
            .build()
            .await
    }

    /// Registry of fact providers; providers may be replaced after assembly
    pub fn registry(&self) -> &Arc<FactRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<FilePolicyProvider> {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<GateMetrics> {
        &self.metrics
    }

    /// Prometheus registry the gate metrics are registered with
    pub fn metrics_registry(&self) -> &Registry {
        &self.metrics_registry
    }

    pub fn pipeline(&self) -> &GatePipeline {
        &self.pipeline
    }

    /// Decide whether `stage` of `deployment_id` may proceed
    ///
    /// The decision carries the hash of the configuration in effect.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, deployment_id: &str, stage: &str) -> GateResult<Decision> {
        let config_id = match self.source.snapshot().await {
            Ok(snapshot) => snapshot.sha.clone(),
            Err(e) => return Err(self.config_error(e, deployment_id, stage).await),
        };

        let request = GateRequest::new(deployment_id, stage).with_config_id(config_id);
        self.pipeline.evaluate(&request).await
    }

    /// Fail unless every fact the policy reads has a registered provider
    pub async fn verify_coverage(&self) -> GateResult<CoverageReport> {
        let bundle = self.policy.load().await?;
        let report = check_provider_coverage(&self.registry, &bundle.required_inputs());

        if !report.is_complete() {
            return Err(GateError::PolicyLoad(format!(
                "policy {} reads facts with no registered provider: {}",
                bundle.id(),
                report.missing.join(", ")
            )));
        }

        if !report.unused.is_empty() {
            info!(unused = ?report.unused, "Registered facts not read by the policy");
        }

        Ok(report)
    }

    async fn config_error(&self, err: GateError, deployment_id: &str, stage: &str) -> GateError {
        self.metrics.record_system_error(err.kind().as_str());
        warn!(error = %err, "Gate cycle aborted: configuration unavailable");

        if let Err(audit_err) = self
            .audit
            .log_system_error(&err, deployment_id, stage, "", "")
            .await
        {
            warn!(error = %audit_err, "Failed to audit system error");
        }

        err
    }
}

/// Prometheus metric names: `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn validate_metrics_prefix(prefix: &str) -> GateResult<()> {
    let mut chars = prefix.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(GateError::ConfigLoad(format!(
            "invalid metrics prefix `{}`",
            prefix
        )))
    }
}

async fn audit_sink(config: &AuditSinkConfig) -> GateResult<Arc<dyn AuditLogger>> {
    Ok(match config {
        AuditSinkConfig::Tracing => Arc::new(TracingAuditLogger::new()),
        AuditSinkConfig::File { path } => Arc::new(JsonFileAuditLogger::new(path.clone()).await?),
    })
}
