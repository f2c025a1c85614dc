//! Configuration surface for the gate

use gate_core::{GateError, GateResult, SnapshotOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level gate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Fact provider settings
    #[serde(default)]
    pub fact_providers: FactProvidersConfig,

    /// Policy source settings
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Audit sink settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl GateConfig {
    /// Parse a YAML (or JSON) document
    pub fn from_yaml(source: &str) -> GateResult<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| GateError::ConfigLoad(format!("invalid configuration: {}", e)))
    }

    /// Snapshot options derived from the fact provider settings
    pub fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions::new()
            .with_max_age(self.fact_providers.max_staleness())
            .with_per_provider_timeout(self.fact_providers.provider_timeout())
    }
}

/// Fact provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactProvidersConfig {
    /// Base URL of the level server
    #[serde(default = "default_level_server_base_url")]
    pub level_server_base_url: String,

    /// How long a remote fact is served from cache, in milliseconds
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum accepted fact age, in milliseconds; 0 disables the check
    #[serde(default = "default_max_staleness_ms")]
    pub max_staleness_ms: u64,

    /// Deadline for one provider call, in milliseconds; 0 means unbounded
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Upper bound on devices in the pending state
    #[serde(default = "default_max_pending_allowed")]
    pub max_pending_allowed: i64,
}

impl FactProvidersConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for FactProvidersConfig {
    fn default() -> Self {
        Self {
            level_server_base_url: default_level_server_base_url(),
            cache_ttl_ms: default_cache_ttl_ms(),
            max_staleness_ms: default_max_staleness_ms(),
            provider_timeout_ms: default_provider_timeout_ms(),
            max_pending_allowed: default_max_pending_allowed(),
        }
    }
}

/// How often the policy source is re-examined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReload {
    /// Load on first use and reuse for the lifetime of the provider
    #[default]
    Once,
    /// Rebuild whenever the file's modification time changes
    OnChange,
}

/// Policy source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Path to the policy source file
    #[serde(default = "default_policy_path")]
    pub path: PathBuf,

    /// Query whose value is the decision object
    #[serde(default = "default_policy_query")]
    pub query: String,

    #[serde(default)]
    pub reload: PolicyReload,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
            query: default_policy_query(),
            reload: PolicyReload::default(),
        }
    }
}

/// Audit configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkConfig,
}

/// Audit sink selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSinkConfig {
    /// Structured log events
    #[default]
    Tracing,

    /// Append-only JSON lines file
    File {
        /// Output file path
        path: PathBuf,
    },
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prefix for every metric name
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: default_metrics_prefix(),
        }
    }
}

// Default value functions

fn default_level_server_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_cache_ttl_ms() -> u64 {
    5_000
}

fn default_max_staleness_ms() -> u64 {
    30_000
}

fn default_provider_timeout_ms() -> u64 {
    2_000
}

fn default_max_pending_allowed() -> i64 {
    500
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("policy/gate.policy")
}

fn default_policy_query() -> String {
    "data.gate.response".to_string()
}

fn default_metrics_prefix() -> String {
    "gate".to_string()
}
