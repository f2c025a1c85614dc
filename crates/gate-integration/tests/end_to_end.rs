mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{gate_config, level_server, metric_path, write_policy, DENY_REASON, DEPLOYMENT, STAGE};
use gate_audit::{AuditRecord, JsonFileAuditLogger, MemoryAuditLogger};
use gate_config::{ConfigSource, PolicyReload, StaticConfigSource};
use gate_core::{ErrorKind, FactProvider, PolicyBundle};
use gate_facts::{LevelServerProvider, MockFactProvider};
use gate_integration::{GateAssembly, PENDING_DELTA_FACT};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn assemble(
    source: Arc<StaticConfigSource>,
) -> (GateAssembly, Arc<MemoryAuditLogger>) {
    let audit = Arc::new(MemoryAuditLogger::new());
    let gate = GateAssembly::builder(source)
        .with_audit(audit.clone())
        .build()
        .await
        .expect("gate should assemble");
    (gate, audit)
}

#[tokio::test]
async fn test_scenario_a_within_limit_allows() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, audit) = assemble(source.clone()).await;

    let decision = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();

    assert!(decision.allow);
    assert!(decision.deny_reasons.is_empty());
    assert_eq!(decision.config_sha, source.snapshot().await.unwrap().sha);
    assert_eq!(decision.policy_sha, gate.policy().load().await.unwrap().id());

    let decisions = audit.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].facts["pending_delta"].as_i64(), Some(100));
    assert_eq!(decisions[0].facts["max_pending_allowed"].as_i64(), Some(500));
    assert!(audit.system_errors().is_empty());
}

#[tokio::test]
async fn test_scenario_b_over_limit_denies() {
    let server = level_server(600).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, audit) = assemble(source).await;

    let decision = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();

    assert!(!decision.allow);
    assert_eq!(decision.deny_reasons, vec![DENY_REASON.to_string()]);
    assert_eq!(audit.decisions()[0].deny_reasons, vec![DENY_REASON.to_string()]);
}

#[tokio::test]
async fn test_scenario_c_stale_fact_then_fresh_fact() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, audit) = assemble(source).await;

    let stale = MockFactProvider::new(PENDING_DELTA_FACT, 100i64, "stale pending delta")
        .with_timestamp(Utc::now() - ChronoDuration::minutes(10));
    gate.registry().register(Arc::new(stale));

    let err = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap_err();
    assert!(err.is(ErrorKind::FactStale));
    assert_eq!(err.fact_id(), Some(PENDING_DELTA_FACT));

    let errors = audit.system_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind, ErrorKind::FactStale);
    assert_eq!(errors[0].policy_id, "");
    assert!(audit.decisions().is_empty());

    let fresh = MockFactProvider::new(PENDING_DELTA_FACT, 100i64, "fresh pending delta")
        .with_timestamp(Utc::now());
    gate.registry().register(Arc::new(fresh));

    let decision = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(decision.allow);
    assert_eq!(audit.decisions().len(), 1);
}

#[tokio::test]
async fn test_level_server_cache_ttl_timestamps() {
    let server = level_server(100).await;
    let provider = LevelServerProvider::new(
        PENDING_DELTA_FACT,
        &server.uri(),
        Duration::from_millis(200),
        "pending delta",
    )
    .unwrap();

    let first = provider.collect(DEPLOYMENT, STAGE).await.unwrap();
    let second = provider.collect(DEPLOYMENT, STAGE).await.unwrap();
    assert_eq!(first.timestamp, second.timestamp);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let third = provider.collect(DEPLOYMENT, STAGE).await.unwrap();
    assert!(third.timestamp > first.timestamp);
}

#[tokio::test]
async fn test_policy_bundle_reused_across_decisions() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, _audit) = assemble(source).await;

    let first = gate.policy().load().await.unwrap();
    gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    let second = gate.policy().load().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_invalid_policy_is_a_system_error() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let mut config = gate_config(&server, &dir, 500);
    config.policy.path = write_policy(dir.path(), "package gate\nallow = = true\n");
    let source = Arc::new(StaticConfigSource::new(config).unwrap());
    let (gate, audit) = assemble(source).await;

    let err = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap_err();

    assert!(err.is(ErrorKind::PolicyLoad));
    assert!(audit.decisions().is_empty());
    let errors = audit.system_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_kind, ErrorKind::PolicyLoad);
    assert_eq!(errors[0].deployment_id, DEPLOYMENT);
}

#[tokio::test]
async fn test_level_server_outage_aborts_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(metric_path(PENDING_DELTA_FACT)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, audit) = assemble(source).await;

    let err = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap_err();

    assert!(err.is(ErrorKind::FactSourceUnavailable));
    assert_eq!(err.fact_id(), Some(PENDING_DELTA_FACT));
    assert_eq!(audit.system_errors().len(), 1);
    assert_eq!(
        gate.metrics()
            .system_errors_total
            .with_label_values(&["fact_source_unavailable"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_configuration_update_is_reflected() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, _audit) = assemble(source.clone()).await;

    let before = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(before.allow);

    source
        .update(gate_config(&server, &dir, 50))
        .unwrap();

    let after = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(!after.allow);
    assert_eq!(after.deny_reasons, vec![DENY_REASON.to_string()]);
    assert_ne!(before.config_sha, after.config_sha);
}

#[tokio::test]
async fn test_policy_edit_picked_up_with_on_change_reload() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let mut config = gate_config(&server, &dir, 500);
    config.policy.reload = PolicyReload::OnChange;
    let policy_path = config.policy.path.clone();
    let source = Arc::new(StaticConfigSource::new(config).unwrap());
    let (gate, _audit) = assemble(source).await;

    let before = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(before.allow);

    let strict = common::POLICY.replace("<= input.max_pending_allowed", "< 0");
    std::fs::write(&policy_path, strict).unwrap();
    let file = std::fs::File::options().write(true).open(&policy_path).unwrap();
    file.set_modified(std::time::SystemTime::now() + Duration::from_secs(10))
        .unwrap();

    let after = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(!after.allow);
    assert_ne!(before.policy_sha, after.policy_sha);
}

#[tokio::test]
async fn test_coverage_check() {
    let server = level_server(100).await;
    let dir = TempDir::new().unwrap();
    let source = Arc::new(StaticConfigSource::new(gate_config(&server, &dir, 500)).unwrap());
    let (gate, _audit) = assemble(source).await;

    let report = gate.verify_coverage().await.unwrap();
    assert_eq!(report.required, vec!["max_pending_allowed", "pending_delta"]);
    assert!(report.missing.is_empty());

    let mut config = gate_config(&server, &dir, 500);
    config.policy.path = write_policy(
        dir.path(),
        "package gate\nresponse = {\"allow\": input.error_budget > 0, \"deny_reasons\": []}\n",
    );
    let (gate, _audit) = assemble(Arc::new(StaticConfigSource::new(config).unwrap())).await;

    let err = gate.verify_coverage().await.unwrap_err();
    assert!(err.is(ErrorKind::PolicyLoad));
    assert!(err.to_string().contains("error_budget"));
}

#[tokio::test]
async fn test_gate_from_yaml_file_with_file_audit() {
    let server = level_server(600).await;
    let dir = TempDir::new().unwrap();
    let policy_path = write_policy(dir.path(), common::POLICY);
    let audit_path = dir.path().join("audit").join("gate.jsonl");
    let config_path = dir.path().join("gate.yaml");
    let yaml = format!(
        "fact_providers:\n  level_server_base_url: {}\n  max_pending_allowed: 500\npolicy:\n  path: {}\naudit:\n  sink:\n    type: file\n    path: {}\nmetrics:\n  prefix: rollout\n",
        server.uri(),
        policy_path.display(),
        audit_path.display()
    );
    std::fs::write(&config_path, yaml).unwrap();

    let gate = GateAssembly::from_file(&config_path).await.unwrap();
    let decision = gate.evaluate(DEPLOYMENT, STAGE).await.unwrap();
    assert!(!decision.allow);
    assert_eq!(decision.config_sha.len(), 64);

    let records = JsonFileAuditLogger::new(&audit_path)
        .await
        .unwrap()
        .read_all()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(matches!(&records[0], AuditRecord::Decision(d) if !d.allow));

    assert!(gate
        .metrics()
        .encode()
        .contains("rollout_decisions_total{outcome=\"deny\"} 1"));
}

#[tokio::test]
async fn test_missing_configuration_file_fails_assembly() {
    let dir = TempDir::new().unwrap();
    let err = GateAssembly::from_file(dir.path().join("missing.yaml"))
        .await
        .err()
        .unwrap();
    assert!(err.is(ErrorKind::ConfigLoad));
}
