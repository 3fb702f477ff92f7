use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::{CounterVec, HistogramVec};

/// Source of monotonically increasing elapsed time.
pub type ElapsedFn = Box<dyn Fn() -> Duration + Send + Sync>;

struct Baseline {
    elapsed: Duration,
    consumed: f64,
}

/// Converts a cumulative consumed-seconds series into point-in-time
/// ratios of the time available between observations.
///
/// Both baselines live under one lock and advance together, so
/// concurrent scrapes never observe a torn pair. A consumed-time
/// regression returns 0.0 and leaves the baselines untouched; the next
/// valid sample is measured against the pre-anomaly state.
pub struct Ratio {
    elapsed_fn: ElapsedFn,
    baseline: Mutex<Baseline>,
}

impl Ratio {
    /// Ratio over an arbitrary elapsed-time source. The elapsed
    /// baseline is captured here; the consumed baseline starts at zero.
    pub fn new(elapsed_fn: ElapsedFn) -> Self {
        let elapsed = elapsed_fn();
        Self {
            elapsed_fn,
            baseline: Mutex::new(Baseline {
                elapsed,
                consumed: 0.0,
            }),
        }
    }

    /// Ratio against total CPU time consumed by this process. A fully
    /// loaded core maps to 1.0 regardless of core count.
    pub fn process_cpu() -> Self {
        Self::new(Box::new(process_cpu_time))
    }

    /// Ratio against wall-clock time since construction.
    pub fn process_time() -> Self {
        let started = Instant::now();
        Self::new(Box::new(move || started.elapsed()))
    }

    /// Fraction of the elapsed time since the previous call that
    /// `consumed_total_seconds` grew by, clamped to [0.0, 1.0].
    pub fn consumed_ratio(&self, consumed_total_seconds: f64) -> f64 {
        let current = (self.elapsed_fn)();
        let mut baseline = self.baseline.lock();

        let elapsed_secs = current.saturating_sub(baseline.elapsed).as_secs_f64();
        let consumed_secs = consumed_total_seconds - baseline.consumed;

        if consumed_secs < 0.0 {
            return 0.0;
        }

        baseline.elapsed = current;
        baseline.consumed = consumed_total_seconds;

        if elapsed_secs == 0.0 {
            return 0.0;
        }

        (consumed_secs / elapsed_secs).min(1.0)
    }
}

/// Sum of observations across every child of a labeled histogram, in
/// seconds.
pub fn histogram_vec_sum(histograms: &HistogramVec) -> f64 {
    histograms
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_histogram().get_sample_sum())
        .sum()
}

/// Sum of counts across every child of a labeled counter.
pub fn counter_vec_sum(counters: &CounterVec) -> f64 {
    counters
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value())
        .sum()
}

/// Cumulative CPU time consumed by this process, user plus system.
///
/// Parsed out of /proc/self/stat; an unreadable stat file reads as
/// zero, which the ratio turns into 0.0 on the next observation.
fn process_cpu_time() -> Duration {
    read_proc_self_stat().unwrap_or(Duration::ZERO)
}

fn read_proc_self_stat() -> Option<Duration> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;

    // The comm field may contain spaces, so field counting starts
    // after its closing paren. utime and stime are fields 14 and 15.
    let rest = stat.rsplit_once(')')?.1;
    let mut fields = rest.split_ascii_whitespace();
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;

    let tick_hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tick_hz <= 0 {
        return None;
    }

    Some(Duration::from_secs_f64(
        (utime + stime) as f64 / tick_hz as f64,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Ratio whose elapsed source replays `readings_ms` one call at a
    /// time. Construction consumes the first reading.
    fn scripted(readings_ms: &[u64]) -> Ratio {
        let readings: Vec<Duration> =
            readings_ms.iter().map(|ms| Duration::from_millis(*ms)).collect();
        let idx = Arc::new(AtomicUsize::new(0));
        Ratio::new(Box::new(move || {
            let i = idx.fetch_add(1, Ordering::Relaxed);
            readings[i.min(readings.len() - 1)]
        }))
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_no_consumption_is_zero() {
        let ratio = scripted(&[0, 100]);
        assert_close(ratio.consumed_ratio(0.0), 0.0);
    }

    #[test]
    fn test_first_observation_against_construction_baseline() {
        assert_close(scripted(&[0, 10_000]).consumed_ratio(1.0), 0.1);
        assert_close(scripted(&[0, 10_000]).consumed_ratio(5.0), 0.5);
        assert_close(scripted(&[0, 10_000]).consumed_ratio(10.0), 1.0);
    }

    #[test]
    fn test_nonzero_construction_baseline() {
        let ratio = scripted(&[8000, 10_000]);
        assert_close(ratio.consumed_ratio(0.5), 0.25);
    }

    #[test]
    fn test_successive_observations_use_deltas() {
        let ratio = scripted(&[0, 1000, 5000, 8000]);
        assert_close(ratio.consumed_ratio(0.99), 0.99);
        assert_close(ratio.consumed_ratio(1.09), 0.1 / 4.0);
        assert_close(ratio.consumed_ratio(1.59), 0.5 / 3.0);
    }

    #[test]
    fn test_overcommit_clamped_to_one() {
        let ratio = scripted(&[0, 1000]);
        assert_close(ratio.consumed_ratio(1.1), 1.0);
    }

    #[test]
    fn test_regression_reads_zero_and_holds_baselines() {
        let ratio = scripted(&[0, 1000, 2000, 3000]);
        assert_close(ratio.consumed_ratio(0.5), 0.5);
        // Consumed time moved backwards; report idle, keep baselines.
        assert_close(ratio.consumed_ratio(0.49), 0.0);
        // Next valid total is measured from before the anomaly.
        assert_close(ratio.consumed_ratio(1.0), 0.25);
    }

    #[test]
    fn test_zero_elapsed_reads_zero_but_advances() {
        let ratio = scripted(&[5000, 5000, 10_000]);
        assert_close(ratio.consumed_ratio(1.0), 0.0);
        assert_close(ratio.consumed_ratio(2.0), 0.2);
    }

    #[test]
    fn test_process_cpu_source_in_range() {
        let ratio = Ratio::process_cpu();
        let value = ratio.consumed_ratio(0.0);
        assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn test_histogram_vec_sum_spans_children() {
        let histograms = HistogramVec::new(
            prometheus::HistogramOpts::new("h_test_sum", "test").buckets(vec![1.0]),
            &["label"],
        )
        .unwrap();
        histograms.with_label_values(&["a"]).observe(0.25);
        histograms.with_label_values(&["b"]).observe(0.5);
        histograms.with_label_values(&["b"]).observe(0.25);

        assert_close(histogram_vec_sum(&histograms), 1.0);
    }

    #[test]
    fn test_counter_vec_sum_spans_children() {
        let counters = CounterVec::new(
            prometheus::Opts::new("c_test_sum", "test"),
            &["label"],
        )
        .unwrap();
        counters.with_label_values(&["a"]).inc_by(2.0);
        counters.with_label_values(&["b"]).inc_by(3.5);

        assert_close(counter_vec_sum(&counters), 5.5);
    }
}
