//! Garbage collection metrics.

use anyhow::Result;
use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};

use super::{MetricProducer, RUNTIME_NAMESPACE};
use crate::correlate::ratio::{histogram_vec_sum, Ratio};
use crate::ingest::event::{GcReason, GcType};
use crate::parsers::gc::GcParser;

const LABEL_GENERATION: &str = "gc_generation";
const LABEL_REASON: &str = "gc_reason";
const LABEL_TYPE: &str = "gc_type";
const LABEL_HEAP: &str = "gc_heap";

/// Heap generation number to metric label. Generations above 2 are the
/// large and pinned object heaps.
fn generation_label(generation: u32) -> &'static str {
    match generation {
        0 => "0",
        1 => "1",
        2 => "2",
        3 => "loh",
        4 => "poh",
        _ => "other",
    }
}

pub struct GcProducer {
    collection_seconds: HistogramVec,
    pause_seconds: Histogram,
    collection_count: CounterVec,
    cpu_ratio: Gauge,
    pause_ratio: Gauge,
    allocated_bytes: CounterVec,
    heap_size_bytes: GaugeVec,
    pinned_objects: Gauge,
    finalization_queue_length: Gauge,
    cpu_ratio_source: Ratio,
    pause_ratio_source: Ratio,
}

impl GcProducer {
    pub fn new(parser: &GcParser, buckets: &[f64]) -> Result<Self> {
        let collection_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gc_collection_seconds",
                "The amount of time spent running garbage collections",
            )
            .namespace(RUNTIME_NAMESPACE)
            .buckets(buckets.to_vec()),
            &[LABEL_GENERATION, LABEL_TYPE],
        )?;
        let pause_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "gc_pause_seconds",
                "The amount of time execution was paused for garbage collection",
            )
            .namespace(RUNTIME_NAMESPACE)
            .buckets(buckets.to_vec()),
        )?;
        let collection_count = CounterVec::new(
            Opts::new(
                "gc_collection_count_total",
                "Counts the number of garbage collections that have occurred",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_GENERATION, LABEL_REASON],
        )?;
        let cpu_ratio = Gauge::with_opts(
            Opts::new(
                "gc_cpu_ratio",
                "The percentage of process CPU time spent running garbage collections",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;
        let pause_ratio = Gauge::with_opts(
            Opts::new(
                "gc_pause_ratio",
                "The percentage of time the process spent paused for garbage collection",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;
        let allocated_bytes = CounterVec::new(
            Opts::new(
                "gc_allocated_bytes_total",
                "The total number of bytes allocated on the managed heap",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_HEAP],
        )?;
        let heap_size_bytes = GaugeVec::new(
            Opts::new(
                "gc_heap_size_bytes",
                "The current size of each heap generation in bytes",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_GENERATION],
        )?;
        let pinned_objects = Gauge::with_opts(
            Opts::new(
                "gc_pinned_objects",
                "The number of pinned objects observed at the last collection",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;
        let finalization_queue_length = Gauge::with_opts(
            Opts::new(
                "gc_finalization_queue_length",
                "The number of objects waiting to be finalized",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;

        {
            let counter = collection_count.clone();
            parser.on_collection_start(Box::new(move |e| {
                counter
                    .with_label_values(&[
                        generation_label(e.generation),
                        GcReason::label_for(e.reason_raw),
                    ])
                    .inc();
            }));
        }
        {
            let histograms = collection_seconds.clone();
            parser.on_collection_complete(Box::new(move |e| {
                histograms
                    .with_label_values(&[
                        generation_label(e.generation),
                        GcType::label_for(e.gc_type_raw),
                    ])
                    .observe(e.duration.as_secs_f64());
            }));
        }
        {
            let histogram = pause_seconds.clone();
            parser.on_pause_complete(Box::new(move |e| {
                histogram.observe(e.duration.as_secs_f64());
            }));
        }
        {
            let gauges = heap_size_bytes.clone();
            let pinned = pinned_objects.clone();
            let finalization = finalization_queue_length.clone();
            parser.on_heap_stats(Box::new(move |e| {
                gauges.with_label_values(&["0"]).set(e.gen0_bytes as f64);
                gauges.with_label_values(&["1"]).set(e.gen1_bytes as f64);
                gauges.with_label_values(&["2"]).set(e.gen2_bytes as f64);
                gauges.with_label_values(&["loh"]).set(e.loh_bytes as f64);
                pinned.set(e.pinned_objects as f64);
                finalization.set(e.finalization_queue_len as f64);
            }));
        }
        {
            let counters = allocated_bytes.clone();
            parser.on_allocation_tick(Box::new(move |e| {
                let heap = if e.large_object_heap { "loh" } else { "soh" };
                counters.with_label_values(&[heap]).inc_by(e.bytes as f64);
            }));
        }

        Ok(Self {
            collection_seconds,
            pause_seconds,
            collection_count,
            cpu_ratio,
            pause_ratio,
            allocated_bytes,
            heap_size_bytes,
            pinned_objects,
            finalization_queue_length,
            cpu_ratio_source: Ratio::process_cpu(),
            pause_ratio_source: Ratio::process_time(),
        })
    }

    /// Cumulative seconds paused for GC, read back out of the
    /// histogram so the ratio and the histogram can never disagree.
    fn pause_seconds_total(&self) -> f64 {
        self.pause_seconds.get_sample_sum()
    }
}

impl MetricProducer for GcProducer {
    fn name(&self) -> &'static str {
        "gc"
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.collection_seconds.clone()))?;
        registry.register(Box::new(self.pause_seconds.clone()))?;
        registry.register(Box::new(self.collection_count.clone()))?;
        registry.register(Box::new(self.cpu_ratio.clone()))?;
        registry.register(Box::new(self.pause_ratio.clone()))?;
        registry.register(Box::new(self.allocated_bytes.clone()))?;
        registry.register(Box::new(self.heap_size_bytes.clone()))?;
        registry.register(Box::new(self.pinned_objects.clone()))?;
        registry.register(Box::new(self.finalization_queue_length.clone()))?;
        Ok(())
    }

    fn update(&self) {
        self.cpu_ratio.set(
            self.cpu_ratio_source
                .consumed_ratio(histogram_vec_sum(&self.collection_seconds)),
        );
        self.pause_ratio.set(
            self.pause_ratio_source
                .consumed_ratio(self.pause_seconds_total()),
        );
    }
}
