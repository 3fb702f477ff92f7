//! Prometheus metric surfaces, one producer per runtime subsystem.
//!
//! Producers subscribe to parser observers at construction; metric
//! handles are registered separately so a producer can be exercised
//! against any registry.

pub mod contention;
pub mod exceptions;
pub mod gc;
pub mod jit;
pub mod threadpool;

use anyhow::Result;
use prometheus::Registry;

/// Namespace prefixing every instrumented-process metric.
pub const RUNTIME_NAMESPACE: &str = "runtime";

/// Histogram buckets for collection and pause durations, in seconds.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0];

/// A subsystem metric producer.
pub trait MetricProducer: Send + Sync {
    /// Producer name for logs.
    fn name(&self) -> &'static str;

    /// Register this producer's metrics with `registry`.
    fn register(&self, registry: &Registry) -> Result<()>;

    /// Refresh derived gauges; called before every scrape.
    fn update(&self) {}
}

/// Boolean metric label.
pub(crate) fn bool_label(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}
