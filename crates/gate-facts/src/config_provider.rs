//! Configuration-backed fact provider

use async_trait::async_trait;
use gate_config::{ConfigSource, GateConfig};
use gate_core::{Fact, FactProvider, FactValue, GateError, GateResult, Schema};
use std::sync::Arc;
use tracing::debug;

/// Derives a fact value from the configuration
pub type ConfigValueFn = Arc<dyn Fn(&GateConfig) -> FactValue + Send + Sync>;

/// Surfaces a configuration value as a fact
///
/// The configuration is re-read through its source on every collect, so an
/// updated configuration is reflected without re-registering. Facts are
/// always stamped with the current time.
pub struct ConfigFactProvider {
    fact_id: String,
    description: String,
    source: Arc<dyn ConfigSource>,
    value_fn: ConfigValueFn,
    error: Option<GateError>,
}

impl ConfigFactProvider {
    pub fn new(
        fact_id: impl Into<String>,
        description: impl Into<String>,
        source: Arc<dyn ConfigSource>,
        value_fn: impl Fn(&GateConfig) -> FactValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            fact_id: fact_id.into(),
            description: description.into(),
            source,
            value_fn: Arc::new(value_fn),
            error: None,
        }
    }

    /// Provider for `max_pending_allowed`
    pub fn max_pending_allowed(source: Arc<dyn ConfigSource>) -> Self {
        Self::new(
            "max_pending_allowed",
            "Maximum allowed devices in pending state",
            source,
            |config| FactValue::Int(config.fact_providers.max_pending_allowed),
        )
    }

    /// Fail every collect with `error`
    pub fn with_error(mut self, error: GateError) -> Self {
        self.error = Some(error);
        self
    }
}

#[async_trait]
impl FactProvider for ConfigFactProvider {
    fn describe(&self) -> Schema {
        Schema::new(&self.fact_id, &self.description)
    }

    async fn collect(&self, _deployment_id: &str, _stage: &str) -> GateResult<Fact> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let snapshot = self.source.snapshot().await?;
        let value = (self.value_fn)(&snapshot.config);
        debug!(fact_id = %self.fact_id, value = %value, config_sha = %snapshot.sha, "Collected configuration fact");

        Ok(Fact::now(&self.fact_id, value))
    }
}
