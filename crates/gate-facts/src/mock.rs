//! Mock fact provider for tests and local runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gate_core::{Fact, FactProvider, FactValue, GateError, GateResult, Schema};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider with a fixed value, optional fixed timestamp, error and delay
#[derive(Debug)]
pub struct MockFactProvider {
    fact_id: String,
    description: String,
    value: FactValue,
    timestamp: Option<DateTime<Utc>>,
    error: Option<GateError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFactProvider {
    /// Provider whose facts are stamped at collect time
    pub fn new(
        fact_id: impl Into<String>,
        value: impl Into<FactValue>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            fact_id: fact_id.into(),
            description: description.into(),
            value: value.into(),
            timestamp: None,
            error: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Stamp every fact with `timestamp`
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fail every collect with `error`
    pub fn with_error(mut self, error: GateError) -> Self {
        self.error = Some(error);
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of collect calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactProvider for MockFactProvider {
    fn describe(&self) -> Schema {
        Schema::new(&self.fact_id, &self.description)
    }

    async fn collect(&self, _deployment_id: &str, _stage: &str) -> GateResult<Fact> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        Ok(Fact::new(
            &self.fact_id,
            self.value.clone(),
            self.timestamp.unwrap_or_else(Utc::now),
        ))
    }
}
