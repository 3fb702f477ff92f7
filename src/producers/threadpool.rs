//! Thread pool metrics.

use anyhow::Result;
use prometheus::{CounterVec, Gauge, Opts, Registry};

use super::{MetricProducer, RUNTIME_NAMESPACE};
use crate::ingest::event::ThreadAdjustmentReason;
use crate::parsers::threadpool::ThreadPoolParser;

const LABEL_REASON: &str = "adjustment_reason";

pub struct ThreadPoolProducer {
    num_threads: Gauge,
    adjustments_total: CounterVec,
    io_num_threads: Gauge,
}

impl ThreadPoolProducer {
    pub fn new(parser: &ThreadPoolParser) -> Result<Self> {
        let num_threads = Gauge::with_opts(
            Opts::new(
                "threadpool_num_threads",
                "The number of active threads in the thread pool",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;
        let adjustments_total = CounterVec::new(
            Opts::new(
                "threadpool_adjustments_total",
                "The total number of changes made to the size of the thread pool",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_REASON],
        )?;
        let io_num_threads = Gauge::with_opts(
            Opts::new(
                "threadpool_io_num_threads",
                "The number of active threads in the IO thread pool",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;

        {
            let gauge = num_threads.clone();
            let counters = adjustments_total.clone();
            parser.on_adjusted(Box::new(move |e| {
                gauge.set(e.thread_count as f64);
                counters
                    .with_label_values(&[ThreadAdjustmentReason::label_for(e.reason_raw)])
                    .inc();
            }));
        }
        {
            let gauge = io_num_threads.clone();
            parser.on_io_adjusted(Box::new(move |e| {
                gauge.set(e.thread_count as f64);
            }));
        }

        Ok(Self {
            num_threads,
            adjustments_total,
            io_num_threads,
        })
    }
}

impl MetricProducer for ThreadPoolProducer {
    fn name(&self) -> &'static str {
        "threadpool"
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.num_threads.clone()))?;
        registry.register(Box::new(self.adjustments_total.clone()))?;
        registry.register(Box::new(self.io_num_threads.clone()))?;
        Ok(())
    }
}
