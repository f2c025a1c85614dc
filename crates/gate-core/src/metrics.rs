//! Prometheus metrics for fact collection and decisions

use crate::error::{GateError, GateResult};
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Gate metrics, registered against a caller-owned registry
pub struct GateMetrics {
    registry: Registry,

    /// Latency of `FactProvider::collect` per provider
    pub fact_collect_latency_seconds: HistogramVec,

    /// Fact collection errors per provider and error type
    pub fact_collect_errors_total: IntCounterVec,

    /// Facts rejected as stale per provider
    pub stale_facts_total: IntCounterVec,

    /// Decisions produced per outcome
    pub decisions_total: IntCounterVec,

    /// Cycles aborted by a system error per error type
    pub system_errors_total: IntCounterVec,
}

impl GateMetrics {
    /// Create and register gate metrics with the default `gate` prefix
    pub fn new(registry: &Registry) -> Self {
        Self::with_prefix(registry, "gate")
    }

    /// Create and register gate metrics under `prefix`
    pub fn with_prefix(registry: &Registry, prefix: &str) -> Self {
        Self::try_with_prefix(registry, prefix).expect("Failed to register gate metrics")
    }

    /// Create and register gate metrics under `prefix`, reporting an invalid
    /// name or a collision with metrics already in `registry` as `ConfigLoad`
    pub fn try_with_prefix(registry: &Registry, prefix: &str) -> GateResult<Self> {
        let fact_collect_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                format!("{}_fact_collect_latency_seconds", prefix),
                "Time spent in FactProvider::collect",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["provider"],
        )
        .map_err(|e| metric_error("fact_collect_latency_seconds", e))?;

        let fact_collect_errors_total = IntCounterVec::new(
            Opts::new(
                format!("{}_fact_collect_errors_total", prefix),
                "Number of fact collection errors",
            ),
            &["provider", "error_type"],
        )
        .map_err(|e| metric_error("fact_collect_errors_total", e))?;

        let stale_facts_total = IntCounterVec::new(
            Opts::new(
                format!("{}_stale_facts_total", prefix),
                "Number of facts that were rejected as stale",
            ),
            &["provider"],
        )
        .map_err(|e| metric_error("stale_facts_total", e))?;

        let decisions_total = IntCounterVec::new(
            Opts::new(
                format!("{}_decisions_total", prefix),
                "Number of decisions produced",
            ),
            &["outcome"],
        )
        .map_err(|e| metric_error("decisions_total", e))?;

        let system_errors_total = IntCounterVec::new(
            Opts::new(
                format!("{}_system_errors_total", prefix),
                "Number of decision cycles aborted by a system error",
            ),
            &["error_type"],
        )
        .map_err(|e| metric_error("system_errors_total", e))?;

        let mut registered: Vec<Box<dyn Collector>> = Vec::new();
        let outcome = (|| -> GateResult<()> {
            register(registry, &mut registered, "fact_collect_latency_seconds", &fact_collect_latency_seconds)?;
            register(registry, &mut registered, "fact_collect_errors_total", &fact_collect_errors_total)?;
            register(registry, &mut registered, "stale_facts_total", &stale_facts_total)?;
            register(registry, &mut registered, "decisions_total", &decisions_total)?;
            register(registry, &mut registered, "system_errors_total", &system_errors_total)?;
            Ok(())
        })();

        if let Err(e) = outcome {
            // Leave the registry as it was
            for collector in registered {
                let _ = registry.unregister(collector);
            }
            return Err(e);
        }

        Ok(Self {
            registry: registry.clone(),
            fact_collect_latency_seconds,
            fact_collect_errors_total,
            stale_facts_total,
            decisions_total,
            system_errors_total,
        })
    }

    /// Record the latency of one collect call
    pub fn observe_collect(&self, provider: &str, seconds: f64) {
        self.fact_collect_latency_seconds
            .with_label_values(&[provider])
            .observe(seconds);
    }

    /// Record a collection error
    pub fn record_collect_error(&self, provider: &str, error_type: &str) {
        self.fact_collect_errors_total
            .with_label_values(&[provider, error_type])
            .inc();
    }

    /// Record a stale fact
    pub fn record_stale(&self, provider: &str) {
        self.stale_facts_total.with_label_values(&[provider]).inc();
    }

    /// Record a produced decision
    pub fn record_decision(&self, allow: bool) {
        let outcome = if allow { "allow" } else { "deny" };
        self.decisions_total.with_label_values(&[outcome]).inc();
    }

    /// Record an aborted cycle
    pub fn record_system_error(&self, error_type: &str) {
        self.system_errors_total
            .with_label_values(&[error_type])
            .inc();
    }

    /// Render all metrics of the backing registry in the text exposition format
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    registered: &mut Vec<Box<dyn Collector>>,
    name: &str,
    collector: &C,
) -> GateResult<()> {
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| metric_error(name, e))?;
    registered.push(Box::new(collector.clone()));
    Ok(())
}

fn metric_error(name: &str, err: prometheus::Error) -> GateError {
    GateError::ConfigLoad(format!("registering metric {}: {}", name, err))
}

impl std::fmt::Debug for GateMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateMetrics").finish_non_exhaustive()
    }
}
