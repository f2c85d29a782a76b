use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use sibyl_core::resolver::{Resolution, Source};

use crate::error::{Result, ServerError};

/// Prometheus metrics registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    question_count: IntCounter,
    resolve_latency: Histogram,
    outcome_count: IntCounterVec,
    cache_hits: IntCounter,
    clarification_count: IntCounter,
    active_connections: IntGauge,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Result<Self> {
        let question_count =
            IntCounter::with_opts(Opts::new("question_count", "Total questions received"))
                .map_err(|err| ServerError::Internal(err.to_string()))?;
        let resolve_latency = Histogram::with_opts(HistogramOpts::new(
            "resolve_latency_seconds",
            "End-to-end resolution latency in seconds",
        ))
        .map_err(|err| ServerError::Internal(err.to_string()))?;
        let outcome_count = IntCounterVec::new(
            Opts::new("outcome_count", "Resolution outcomes by source"),
            &["source"],
        )
        .map_err(|err| ServerError::Internal(err.to_string()))?;
        let cache_hits = IntCounter::with_opts(Opts::new("cache_hits", "Answer cache hits"))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        let clarification_count =
            IntCounter::with_opts(Opts::new("clarification_count", "Clarification turns"))
                .map_err(|err| ServerError::Internal(err.to_string()))?;
        let active_connections =
            IntGauge::with_opts(Opts::new("active_connections", "Active connections"))
                .map_err(|err| ServerError::Internal(err.to_string()))?;

        let registry = Registry::new();
        registry
            .register(Box::new(question_count.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        registry
            .register(Box::new(resolve_latency.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        registry
            .register(Box::new(outcome_count.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        registry
            .register(Box::new(cache_hits.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        registry
            .register(Box::new(clarification_count.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        registry
            .register(Box::new(active_connections.clone()))
            .map_err(|err| ServerError::Internal(err.to_string()))?;

        Ok(Self {
            registry,
            question_count,
            resolve_latency,
            outcome_count,
            cache_hits,
            clarification_count,
            active_connections,
        })
    }

    /// Record a completed resolution turn.
    pub fn record_resolution(&self, duration: Duration, resolution: &Resolution) {
        self.question_count.inc();
        self.resolve_latency.observe(duration.as_secs_f64());
        match resolution {
            Resolution::Answer { source, .. } => {
                self.outcome_count.with_label_values(&[source.as_str()]).inc();
                if matches!(source, Source::Cache) {
                    self.cache_hits.inc();
                }
            }
            Resolution::Clarify { .. } => {
                self.outcome_count.with_label_values(&["clarify"]).inc();
                self.clarification_count.inc();
            }
            Resolution::Error { source, .. } => {
                let label = format!(
                    "error_{}",
                    source.map(|s| s.as_str()).unwrap_or("input")
                );
                self.outcome_count.with_label_values(&[label.as_str()]).inc();
            }
        }
    }

    /// Track connection count delta.
    pub fn record_connection(&self, delta: i64) {
        if delta >= 0 {
            self.active_connections.add(delta);
        } else {
            self.active_connections.sub(-delta);
        }
    }

    /// Render metrics in Prometheus text format.
    pub fn expose_prometheus(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        String::from_utf8(buffer)
            .map_err(|err| ServerError::Internal(format!("invalid metrics utf8: {err}")))
    }
}
