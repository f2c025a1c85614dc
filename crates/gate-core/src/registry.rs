//! Fact registry
//!
//! The registry owns the fact id → provider mapping and runs snapshots: one
//! bounded-time, all-or-nothing parallel collection across every registered
//! provider.
//!
//! Each provider runs in its own task. Tasks are owned by the snapshot, so
//! dropping the snapshot future (for example because the caller wrapped it
//! in `tokio::time::timeout`) aborts every in-flight collection. A
//! per-provider timeout bounds each collection independently of its siblings.
//!
//! When several providers fail, the error surfaced is the first one received
//! in completion order. That choice is not stable across runs; callers must
//! not depend on which of several simultaneous failures wins.

use crate::error::{GateError, GateResult};
use crate::fact::{FactMap, FactProvider, FactValue};
use crate::metrics::GateMetrics;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Per-call snapshot tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Maximum fact age; zero disables the check
    pub max_age: Duration,

    /// Deadline for each provider call; zero means unbounded
    pub per_provider_timeout: Duration,
}

impl SnapshotOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum fact age
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the per-provider timeout
    pub fn with_per_provider_timeout(mut self, timeout: Duration) -> Self {
        self.per_provider_timeout = timeout;
        self
    }
}

/// Registry of fact providers keyed by schema id
pub struct FactRegistry {
    providers: RwLock<HashMap<String, Arc<dyn FactProvider>>>,
    metrics: Option<Arc<GateMetrics>>,
}

impl FactRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Record collection latency, errors and staleness
    pub fn with_metrics(mut self, metrics: Arc<GateMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a provider under its schema id, replacing any previous one
    pub fn register(&self, provider: Arc<dyn FactProvider>) {
        let schema = provider.describe();
        debug!(fact_id = %schema.id, "Registering fact provider");

        let previous = self.providers.write().insert(schema.id.clone(), provider);
        if previous.is_some() {
            debug!(fact_id = %schema.id, "Replaced existing fact provider");
        }
    }

    /// Provider registered for `fact_id`
    pub fn get_provider(&self, fact_id: &str) -> Option<Arc<dyn FactProvider>> {
        self.providers.read().get(fact_id).cloned()
    }

    /// Registered fact ids, sorted
    pub fn fact_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Collect every fact with no timeout or staleness enforcement
    pub async fn snapshot(&self, deployment_id: &str, stage: &str) -> GateResult<FactMap> {
        self.snapshot_with_options(deployment_id, stage, SnapshotOptions::default())
            .await
    }

    /// Collect every fact in parallel under `options`
    ///
    /// Fails as a whole if any provider fails or returns a stale fact; no
    /// partial map is ever returned.
    #[instrument(skip(self, options), fields(deployment_id = %deployment_id, stage = %stage))]
    pub async fn snapshot_with_options(
        &self,
        deployment_id: &str,
        stage: &str,
        options: SnapshotOptions,
    ) -> GateResult<FactMap> {
        // Point-in-time copy so registration never races with iteration
        let providers: Vec<(String, Arc<dyn FactProvider>)> = self
            .providers
            .read()
            .iter()
            .map(|(id, provider)| (id.clone(), provider.clone()))
            .collect();

        if providers.is_empty() {
            return Ok(FactMap::new());
        }

        let expected = providers.len();
        let deployment_id: Arc<str> = Arc::from(deployment_id);
        let stage: Arc<str> = Arc::from(stage);
        let (tx, mut rx) = mpsc::channel(expected);
        let mut tasks = JoinSet::new();

        for (id, provider) in providers {
            let tx = tx.clone();
            let deployment_id = deployment_id.clone();
            let stage = stage.clone();
            let metrics = self.metrics.clone();

            tasks.spawn(async move {
                let outcome = collect_one(
                    &id,
                    provider.as_ref(),
                    &deployment_id,
                    &stage,
                    options,
                    metrics.as_deref(),
                )
                .await;
                // The receiver outlives every task; a send error means the
                // snapshot itself was dropped.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut facts = FactMap::new();
        let mut first_error: Option<GateError> = None;
        let mut received = 0;

        while let Some(outcome) = rx.recv().await {
            received += 1;
            match outcome {
                Ok((id, value)) => {
                    facts.insert(id, value);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // A task that never reported must have panicked
        if received < expected {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Fact provider task failed");
                    if first_error.is_none() {
                        let message = if e.is_panic() {
                            "provider task panicked"
                        } else {
                            "provider task cancelled"
                        };
                        first_error = Some(GateError::Provider(message.to_string()));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            warn!(error = %e, "Snapshot failed");
            return Err(e);
        }

        debug!(fact_count = facts.len(), "Snapshot collected");
        Ok(facts)
    }
}

impl Default for FactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactRegistry")
            .field("fact_ids", &self.fact_ids())
            .finish()
    }
}

/// Run one provider under the snapshot options and classify the outcome
async fn collect_one(
    id: &str,
    provider: &dyn FactProvider,
    deployment_id: &str,
    stage: &str,
    options: SnapshotOptions,
    metrics: Option<&GateMetrics>,
) -> GateResult<(String, FactValue)> {
    let start = Instant::now();

    let collected = if options.per_provider_timeout.is_zero() {
        provider.collect(deployment_id, stage).await
    } else {
        match tokio::time::timeout(
            options.per_provider_timeout,
            provider.collect(deployment_id, stage),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                if let Some(m) = metrics {
                    m.record_collect_error(id, "timeout");
                }
                return Err(GateError::collecting(
                    id,
                    GateError::FactSourceUnavailable(format!(
                        "timed out after {}ms",
                        options.per_provider_timeout.as_millis()
                    )),
                ));
            }
        }
    };

    if let Some(m) = metrics {
        m.observe_collect(id, start.elapsed().as_secs_f64());
    }

    let fact = match collected {
        Ok(fact) => fact,
        Err(e) => {
            if let Some(m) = metrics {
                m.record_collect_error(id, e.kind().as_str());
            }
            warn!(fact_id = %id, error = %e, "Fact collection failed");
            return Err(GateError::collecting(id, e));
        }
    };

    if !options.max_age.is_zero() {
        let age = fact.age_at(Utc::now());
        if age > options.max_age {
            if let Some(m) = metrics {
                m.record_stale(id);
            }
            warn!(
                fact_id = %id,
                age_ms = age.as_millis() as u64,
                max_age_ms = options.max_age.as_millis() as u64,
                "Fact is stale"
            );
            return Err(GateError::collecting(
                id,
                GateError::FactStale {
                    fact_id: id.to_string(),
                    age,
                    max_age: options.max_age,
                },
            ));
        }
    }

    Ok((fact.id, fact.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fact::{Fact, Schema};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use prometheus::Registry;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestProvider {
        id: String,
        fact_id: Option<String>,
        value: FactValue,
        timestamp: Option<DateTime<Utc>>,
        delay: Option<Duration>,
        err: Option<GateError>,
        completed: Arc<AtomicBool>,
    }

    impl TestProvider {
        fn new(id: &str, value: impl Into<FactValue>) -> Self {
            Self {
                id: id.into(),
                fact_id: None,
                value: value.into(),
                timestamp: None,
                delay: None,
                err: None,
                completed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing(id: &str, err: GateError) -> Self {
            let mut provider = Self::new(id, 0);
            provider.err = Some(err);
            provider
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
            self.timestamp = Some(timestamp);
            self
        }
    }

    #[async_trait]
    impl FactProvider for TestProvider {
        fn describe(&self) -> Schema {
            Schema::new(&self.id, "test fact")
        }

        async fn collect(&self, _deployment_id: &str, _stage: &str) -> GateResult<Fact> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.completed.store(true, Ordering::SeqCst);
            if let Some(err) = &self.err {
                return Err(err.clone());
            }
            let id = self.fact_id.clone().unwrap_or_else(|| self.id.clone());
            Ok(Fact::new(
                id,
                self.value.clone(),
                self.timestamp.unwrap_or_else(Utc::now),
            ))
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl FactProvider for PanickingProvider {
        fn describe(&self) -> Schema {
            Schema::new("boom", "panics")
        }

        async fn collect(&self, _deployment_id: &str, _stage: &str) -> GateResult<Fact> {
            panic!("provider blew up");
        }
    }

    #[test]
    fn test_register_and_get_provider() {
        let registry = FactRegistry::new();
        let provider: Arc<dyn FactProvider> = Arc::new(TestProvider::new("test_fact", 42));
        registry.register(provider.clone());

        let retrieved = registry.get_provider("test_fact").unwrap();
        assert!(Arc::ptr_eq(&retrieved, &provider));
        assert!(registry.get_provider("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_same_id_last_wins() {
        let registry = FactRegistry::new();
        let first: Arc<dyn FactProvider> = Arc::new(TestProvider::new("fact", 1));
        let second: Arc<dyn FactProvider> = Arc::new(TestProvider::new("fact", 2));

        registry.register(first.clone());
        registry.register(second.clone());

        let retrieved = registry.get_provider("fact").unwrap();
        assert!(Arc::ptr_eq(&retrieved, &second));
        assert!(!Arc::ptr_eq(&retrieved, &first));
        assert_eq!(registry.fact_ids(), vec!["fact".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_successful() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(TestProvider::new("fact1", 42)));
        registry.register(Arc::new(TestProvider::new("fact2", "value")));

        let facts = registry
            .snapshot("test-deployment", "test-stage")
            .await
            .unwrap();

        assert_eq!(facts.len(), 2);
        assert_eq!(facts["fact1"], FactValue::Int(42));
        assert_eq!(facts["fact2"], FactValue::from("value"));
    }

    #[tokio::test]
    async fn test_snapshot_empty_registry() {
        let registry = FactRegistry::new();
        let facts = registry.snapshot("d", "s").await.unwrap();
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_keys_by_returned_fact_id() {
        let registry = FactRegistry::new();
        let mut provider = TestProvider::new("schema_id", 7);
        provider.fact_id = Some("returned_id".into());
        registry.register(Arc::new(provider));

        let facts = registry.snapshot("d", "s").await.unwrap();
        assert_eq!(facts.get("returned_id"), Some(&FactValue::Int(7)));
        assert!(!facts.contains_key("schema_id"));
    }

    #[tokio::test]
    async fn test_snapshot_with_error() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(TestProvider::new("ok_fact", 1)));
        registry.register(Arc::new(TestProvider::failing(
            "error_fact",
            GateError::Provider("test error".into()),
        )));

        let err = registry.snapshot("d", "s").await.unwrap_err();
        assert_eq!(err.to_string(), "collecting fact error_fact: test error");
        assert!(err.is(ErrorKind::Provider));
    }

    #[tokio::test]
    async fn test_snapshot_preserves_provider_error_kind() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(TestProvider::failing(
            "pending_delta",
            GateError::FactSourceUnavailable("status 503".into()),
        )));

        let err = registry
            .snapshot_with_options("d", "s", SnapshotOptions::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::FactSourceUnavailable));
        assert_eq!(err.fact_id(), Some("pending_delta"));
    }

    #[tokio::test]
    async fn test_multiple_failures_surface_one_of_them() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(TestProvider::failing(
            "a",
            GateError::FactSourceUnavailable("down".into()),
        )));
        registry.register(Arc::new(TestProvider::failing(
            "b",
            GateError::FactDecode("bad json".into()),
        )));

        let err = registry.snapshot("d", "s").await.unwrap_err();
        assert!(matches!(err.fact_id(), Some("a") | Some("b")));
    }

    #[tokio::test]
    async fn test_stale_fact_fails_snapshot() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(
            TestProvider::new("pending_delta", 100)
                .with_timestamp(Utc::now() - chrono::Duration::minutes(10)),
        ));
        registry.register(Arc::new(TestProvider::new("max_pending_allowed", 500)));

        let options = SnapshotOptions::new().with_max_age(Duration::from_secs(300));
        let err = registry
            .snapshot_with_options("d", "s", options)
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::FactStale));
        assert_eq!(err.fact_id(), Some("pending_delta"));
    }

    #[tokio::test]
    async fn test_old_fact_allowed_without_max_age() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(
            TestProvider::new("pending_delta", 100)
                .with_timestamp(Utc::now() - chrono::Duration::hours(3)),
        ));

        let facts = registry.snapshot("d", "s").await.unwrap();
        assert_eq!(facts["pending_delta"], FactValue::Int(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_provider_timeout() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(
            TestProvider::new("slow", 1).with_delay(Duration::from_secs(10)),
        ));
        registry.register(Arc::new(TestProvider::new("fast", 2)));

        let options = SnapshotOptions::new().with_per_provider_timeout(Duration::from_millis(100));
        let started = tokio::time::Instant::now();
        let err = registry
            .snapshot_with_options("d", "s", options)
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::FactSourceUnavailable));
        assert_eq!(err.fact_id(), Some("slow"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_providers_collect_in_parallel() {
        let registry = FactRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(Arc::new(
                TestProvider::new(id, 1).with_delay(Duration::from_secs(1)),
            ));
        }

        let started = tokio::time::Instant::now();
        let facts = registry.snapshot("d", "s").await.unwrap();

        assert_eq!(facts.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_snapshot_cancels_providers() {
        let registry = FactRegistry::new();
        let provider = TestProvider::new("slow", 1).with_delay(Duration::from_secs(5));
        let completed = provider.completed.clone();
        registry.register(Arc::new(provider));

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            registry.snapshot("d", "s"),
        )
        .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_provider_fails_snapshot() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(PanickingProvider));
        registry.register(Arc::new(TestProvider::new("fine", 1)));

        let err = registry.snapshot("d", "s").await.unwrap_err();
        assert!(err.is(ErrorKind::Provider));
        assert_eq!(err.to_string(), "provider task panicked");
    }

    #[tokio::test]
    async fn test_snapshot_records_metrics() {
        let prometheus = Registry::new();
        let metrics = Arc::new(GateMetrics::new(&prometheus));
        let registry = FactRegistry::new().with_metrics(metrics.clone());
        registry.register(Arc::new(
            TestProvider::new("old", 1).with_timestamp(Utc::now() - chrono::Duration::hours(1)),
        ));

        let options = SnapshotOptions::new().with_max_age(Duration::from_secs(60));
        let _ = registry.snapshot_with_options("d", "s", options).await;

        assert_eq!(metrics.stale_facts_total.with_label_values(&["old"]).get(), 1);
        assert_eq!(
            metrics
                .fact_collect_latency_seconds
                .with_label_values(&["old"])
                .get_sample_count(),
            1
        );
    }
}
