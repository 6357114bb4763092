//! Prometheus metrics definitions for stratforge
//!
//! All metrics use the `stratforge_` prefix and are rendered on demand.

use prometheus::{
    CounterVec, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the generation pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Finished runs by terminal status
    pub runs_total: CounterVec,
    /// Runs currently executing
    pub runs_in_flight: IntGauge,
    /// Repair-loop attempts by outcome
    pub attempts_total: CounterVec,
    /// Static validation findings by category and severity
    pub validation_findings_total: CounterVec,
    /// Language model calls retried after a transient failure
    pub llm_retries_total: IntCounter,
    /// Sandbox wall-clock time by outcome
    pub sandbox_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with all counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("stratforge_runs_total", "Finished pipeline runs by status"),
            &["status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let runs_in_flight = IntGauge::with_opts(Opts::new(
            "stratforge_runs_in_flight",
            "Pipeline runs currently executing",
        ))?;
        registry.register(Box::new(runs_in_flight.clone()))?;

        let attempts_total = CounterVec::new(
            Opts::new("stratforge_attempts_total", "Repair-loop attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let validation_findings_total = CounterVec::new(
            Opts::new(
                "stratforge_validation_findings_total",
                "Static validation findings by category and severity",
            ),
            &["category", "severity"],
        )?;
        registry.register(Box::new(validation_findings_total.clone()))?;

        let llm_retries_total = IntCounter::with_opts(Opts::new(
            "stratforge_llm_retries_total",
            "Language model calls retried after a transient failure",
        ))?;
        registry.register(Box::new(llm_retries_total.clone()))?;

        let sandbox_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "stratforge_sandbox_duration_seconds",
                "Sandbox run wall-clock time in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(sandbox_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            runs_total,
            runs_in_flight,
            attempts_total,
            validation_findings_total,
            llm_retries_total,
            sandbox_duration_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_runs(&self, status: &str) {
        self.runs_total.with_label_values(&[status]).inc();
    }

    pub fn inc_attempts(&self, outcome: &str) {
        self.attempts_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_findings(&self, category: &str, severity: &str) {
        self.validation_findings_total
            .with_label_values(&[category, severity])
            .inc();
    }

    pub fn observe_sandbox(&self, outcome: &str, seconds: f64) {
        self.sandbox_duration_seconds
            .with_label_values(&[outcome])
            .observe(seconds);
    }
}
