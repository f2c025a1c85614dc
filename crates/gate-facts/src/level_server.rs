//! Level server fact provider
//!
//! Fetches one metric from
//! `{base_url}/api/deployments/{deployment}/stages/{stage}/metrics/{fact}`,
//! which answers `{"value": <number>}`. Results are cached per
//! `(deployment, stage)` for a fixed TTL; a cache hit returns the cached
//! fact unchanged, including its original timestamp.

use async_trait::async_trait;
use gate_core::{Fact, FactProvider, FactValue, GateError, GateResult, Schema};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode, Url};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

struct CachedFact {
    fact: Fact,
    expires_at: Instant,
}

/// Caching HTTP provider for one level server metric
pub struct LevelServerProvider {
    fact_id: String,
    description: String,
    base_url: Url,
    cache_ttl: Duration,
    client: Client,
    cache: RwLock<HashMap<(String, String), CachedFact>>,
}

impl LevelServerProvider {
    pub fn new(
        fact_id: impl Into<String>,
        base_url: &str,
        cache_ttl: Duration,
        description: impl Into<String>,
    ) -> GateResult<Self> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                GateError::ConfigLoad(format!("invalid level server url `{}`", base_url))
            })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GateError::Provider(format!("building http client: {}", e)))?;

        Ok(Self {
            fact_id: fact_id.into(),
            description: description.into(),
            base_url,
            cache_ttl,
            client,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Ids are pushed as single path segments, so `/`, `?` and `#` are escaped
    fn metric_url(&self, deployment_id: &str, stage: &str) -> GateResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GateError::FactSourceUnavailable(format!("cannot build url from {}", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "api",
                "deployments",
                deployment_id,
                "stages",
                stage,
                "metrics",
                self.fact_id.as_str(),
            ]);
        Ok(url)
    }

    fn cached(&self, key: &(String, String)) -> Option<Fact> {
        let cache = self.cache.read();
        cache
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.fact.clone())
    }

    async fn fetch(&self, deployment_id: &str, stage: &str) -> GateResult<FactValue> {
        let url = self.metric_url(deployment_id, stage)?;
        debug!(fact_id = %self.fact_id, url = %url, "Fetching fact from level server");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| GateError::FactSourceUnavailable(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(GateError::FactSourceUnavailable(format!(
                "unexpected status code {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::FactSourceUnavailable(format!("reading body: {}", e)))?;

        decode_value(&body)
    }
}

/// Decode `{"value": <number>}`
fn decode_value(body: &[u8]) -> GateResult<FactValue> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| GateError::FactDecode(e.to_string()))?;

    let value = json
        .get("value")
        .ok_or_else(|| GateError::FactDecode("missing field `value`".into()))?;

    if let Some(i) = value.as_i64() {
        Ok(FactValue::Int(i))
    } else if let Some(f) = value.as_f64() {
        Ok(FactValue::Float(f))
    } else {
        Err(GateError::FactDecode(format!(
            "field `value` is not a number: {}",
            value
        )))
    }
}

#[async_trait]
impl FactProvider for LevelServerProvider {
    fn describe(&self) -> Schema {
        Schema::new(&self.fact_id, &self.description)
    }

    async fn collect(&self, deployment_id: &str, stage: &str) -> GateResult<Fact> {
        let key = (deployment_id.to_string(), stage.to_string());

        if let Some(fact) = self.cached(&key) {
            debug!(fact_id = %self.fact_id, "Level server cache hit");
            return Ok(fact);
        }

        let value = self.fetch(deployment_id, stage).await.map_err(|e| {
            warn!(fact_id = %self.fact_id, error = %e, "Level server fetch failed");
            e
        })?;

        let fact = Fact::now(&self.fact_id, value);
        let now = Instant::now();
        let mut cache = self.cache.write();
        cache.retain(|_, entry| entry.expires_at > now);
        cache.insert(
            key,
            CachedFact {
                fact: fact.clone(),
                expires_at: now + self.cache_ttl,
            },
        );

        Ok(fact)
    }
}
