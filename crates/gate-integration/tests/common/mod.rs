//! Shared fixtures for end-to-end gate tests

#![allow(dead_code)]

use gate_config::{GateConfig, PolicyReload};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DEPLOYMENT: &str = "fw-rollout-42";
pub const STAGE: &str = "canary";

pub const POLICY: &str = r#"
package gate

default allow = false
allow = true if input.pending_delta <= input.max_pending_allowed

deny "pending_delta exceeds allowed limit" if input.pending_delta > input.max_pending_allowed

response = {"allow": allow, "deny_reasons": deny_reasons}
"#;

pub const DENY_REASON: &str = "pending_delta exceeds allowed limit";

pub fn metric_path(fact_id: &str) -> String {
    format!(
        "/api/deployments/{}/stages/{}/metrics/{}",
        DEPLOYMENT, STAGE, fact_id
    )
}

/// Level server answering `pending_delta` for the test deployment
pub async fn level_server(pending_delta: i64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(metric_path("pending_delta")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": pending_delta })),
        )
        .mount(&server)
        .await;
    server
}

pub fn write_policy(dir: &Path, source: &str) -> PathBuf {
    let path = dir.join("gate.policy");
    std::fs::write(&path, source).expect("policy fixture should be writable");
    path
}

/// Configuration pointing at `server` and the policy in `dir`
pub fn gate_config(server: &MockServer, dir: &TempDir, max_pending_allowed: i64) -> GateConfig {
    let mut config = GateConfig::default();
    config.fact_providers.level_server_base_url = server.uri();
    config.fact_providers.max_pending_allowed = max_pending_allowed;
    config.fact_providers.max_staleness_ms = 5 * 60 * 1000;
    config.fact_providers.provider_timeout_ms = 2000;
    config.policy.path = write_policy(dir.path(), POLICY);
    config.policy.reload = PolicyReload::Once;
    config
}
