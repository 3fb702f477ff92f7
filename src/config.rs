use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::correlate::pair::DEFAULT_PENDING_TTL;
use crate::correlate::sampling::SampleEvery;
use crate::producers::DEFAULT_DURATION_BUCKETS;

/// Top-level configuration for the runtimoor agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Event ingest listener configuration.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Prometheus exposition server configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Start/end event correlation configuration.
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Per-subsystem collector configuration.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

/// Event ingest listener configuration.
#[derive(Debug, Deserialize)]
pub struct IngestConfig {
    /// Listen address for runtime connections. Default: "127.0.0.1:9525".
    #[serde(default = "default_ingest_addr")]
    pub addr: String,
}

/// Prometheus exposition server configuration.
#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for /metrics and /healthz. Default: "0.0.0.0:9640".
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

/// Start/end event correlation configuration.
#[derive(Debug, Deserialize)]
pub struct CorrelationConfig {
    /// How long an unmatched start event is retained. Default: 5m.
    #[serde(default = "default_correlation_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Initial capacity of each pending-start cache. Default: 512.
    #[serde(default = "default_correlation_capacity")]
    pub capacity: usize,
}

/// Per-subsystem collector configuration.
#[derive(Debug, Default, Deserialize)]
pub struct CollectorsConfig {
    /// Garbage collection metrics.
    #[serde(default)]
    pub gc: GcCollectorConfig,

    /// Monitor contention metrics.
    #[serde(default)]
    pub contention: ContentionCollectorConfig,

    /// JIT compilation metrics.
    #[serde(default)]
    pub jit: JitCollectorConfig,

    /// Thread pool metrics.
    #[serde(default)]
    pub threadpool: ThreadPoolCollectorConfig,

    /// Exception metrics.
    #[serde(default)]
    pub exceptions: ExceptionsCollectorConfig,
}

/// Garbage collection collector configuration.
#[derive(Debug, Deserialize)]
pub struct GcCollectorConfig {
    /// Enable the GC collector. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bucket boundaries (seconds) for GC duration histograms.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

/// Monitor contention collector configuration.
#[derive(Debug, Deserialize)]
pub struct ContentionCollectorConfig {
    /// Enable the contention collector. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Observe every Nth contention event. Default: 2.
    #[serde(default = "default_contention_sample_every")]
    pub sample_every: u32,
}

/// JIT compilation collector configuration.
#[derive(Debug, Deserialize)]
pub struct JitCollectorConfig {
    /// Enable the JIT collector. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Observe every Nth method compilation. Default: 10.
    #[serde(default = "default_jit_sample_every")]
    pub sample_every: u32,
}

/// Thread pool collector configuration.
#[derive(Debug, Deserialize)]
pub struct ThreadPoolCollectorConfig {
    /// Enable the thread pool collector. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Exception collector configuration.
#[derive(Debug, Deserialize)]
pub struct ExceptionsCollectorConfig {
    /// Enable the exception collector. Default: true.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ingest_addr() -> String {
    "127.0.0.1:9525".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9640".to_string()
}

fn default_correlation_ttl() -> Duration {
    DEFAULT_PENDING_TTL
}

fn default_correlation_capacity() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_histogram_buckets() -> Vec<f64> {
    DEFAULT_DURATION_BUCKETS.to_vec()
}

fn default_contention_sample_every() -> u32 {
    2
}

fn default_jit_sample_every() -> u32 {
    10
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ingest: IngestConfig::default(),
            metrics: MetricsConfig::default(),
            correlation: CorrelationConfig::default(),
            collectors: CollectorsConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            addr: default_ingest_addr(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            addr: default_metrics_addr(),
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            ttl: default_correlation_ttl(),
            capacity: default_correlation_capacity(),
        }
    }
}

impl Default for GcCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

impl Default for ContentionCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_every: default_contention_sample_every(),
        }
    }
}

impl Default for JitCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_every: default_jit_sample_every(),
        }
    }
}

impl Default for ThreadPoolCollectorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for ExceptionsCollectorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        parse_listen_addr(&self.ingest.addr).context("invalid ingest.addr")?;
        parse_listen_addr(&self.metrics.addr).context("invalid metrics.addr")?;

        if self.correlation.ttl.is_zero() {
            bail!("correlation.ttl must be positive");
        }
        if self.correlation.capacity == 0 {
            bail!("correlation.capacity must be positive");
        }

        if self.collectors.gc.enabled {
            validate_buckets(&self.collectors.gc.histogram_buckets)
                .context("invalid collectors.gc.histogram_buckets")?;
        }
        if self.collectors.contention.enabled {
            validate_sample_every(self.collectors.contention.sample_every)
                .context("invalid collectors.contention.sample_every")?;
        }
        if self.collectors.jit.enabled {
            validate_sample_every(self.collectors.jit.sample_every)
                .context("invalid collectors.jit.sample_every")?;
        }

        Ok(())
    }
}

/// Parse a listen address, accepting the ":port" shorthand for all interfaces.
fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    if addr.is_empty() {
        bail!("address is empty");
    }
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    full.parse::<SocketAddr>()
        .with_context(|| format!("cannot parse listen address {addr:?}"))
}

fn validate_buckets(buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        bail!("at least one bucket boundary is required");
    }
    for window in buckets.windows(2) {
        if window[1] <= window[0] {
            bail!("bucket boundaries must be strictly ascending");
        }
    }
    if buckets[0] <= 0.0 {
        bail!("bucket boundaries must be positive");
    }
    Ok(())
}

fn validate_sample_every(divisor: u32) -> Result<()> {
    if SampleEvery::from_u32(divisor).is_none() {
        let supported: Vec<String> = SampleEvery::all()
            .iter()
            .map(|s| s.divisor().to_string())
            .collect();
        bail!(
            "sample_every {divisor} is not supported (choose one of {})",
            supported.join(", ")
        );
    }
    Ok(())
}
