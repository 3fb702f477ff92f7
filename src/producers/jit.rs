//! Method compilation metrics.

use anyhow::Result;
use prometheus::{CounterVec, Gauge, Opts, Registry};

use super::{bool_label, MetricProducer, RUNTIME_NAMESPACE};
use crate::correlate::ratio::{counter_vec_sum, Ratio};
use crate::parsers::jit::JitParser;

const LABEL_DYNAMIC: &str = "dynamic";

pub struct JitProducer {
    methods_total: CounterVec,
    seconds_total: CounterVec,
    cpu_ratio: Gauge,
    cpu_ratio_source: Ratio,
}

impl JitProducer {
    pub fn new(parser: &JitParser) -> Result<Self> {
        let methods_total = CounterVec::new(
            Opts::new(
                "jit_method_total",
                "The number of methods compiled by the JIT compiler",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_DYNAMIC],
        )?;
        let seconds_total = CounterVec::new(
            Opts::new(
                "jit_method_seconds_total",
                "The amount of time spent JIT-compiling methods",
            )
            .namespace(RUNTIME_NAMESPACE),
            &[LABEL_DYNAMIC],
        )?;
        let cpu_ratio = Gauge::with_opts(
            Opts::new(
                "jit_cpu_ratio",
                "The percentage of process CPU time spent JIT-compiling methods",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;

        let divisor = parser.sample_every().divisor() as f64;
        {
            let methods = methods_total.clone();
            let seconds = seconds_total.clone();
            parser.on_compilation_complete(Box::new(move |e| {
                let labels = [bool_label(e.dynamic)];
                methods.with_label_values(&labels).inc_by(divisor);
                seconds
                    .with_label_values(&labels)
                    .inc_by(divisor * e.duration.as_secs_f64());
            }));
        }

        Ok(Self {
            methods_total,
            seconds_total,
            cpu_ratio,
            cpu_ratio_source: Ratio::process_cpu(),
        })
    }
}

impl MetricProducer for JitProducer {
    fn name(&self) -> &'static str {
        "jit"
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.methods_total.clone()))?;
        registry.register(Box::new(self.seconds_total.clone()))?;
        registry.register(Box::new(self.cpu_ratio.clone()))?;
        Ok(())
    }

    fn update(&self) {
        self.cpu_ratio.set(
            self.cpu_ratio_source
                .consumed_ratio(counter_vec_sum(&self.seconds_total)),
        );
    }
}
