//! Exception metrics.

use anyhow::Result;
use prometheus::{Counter, Opts, Registry};

use super::{MetricProducer, RUNTIME_NAMESPACE};
use crate::parsers::exceptions::ExceptionParser;

pub struct ExceptionProducer {
    total: Counter,
}

impl ExceptionProducer {
    pub fn new(parser: &ExceptionParser) -> Result<Self> {
        let total = Counter::with_opts(
            Opts::new(
                "exceptions_total",
                "The number of exceptions thrown",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;

        {
            let total = total.clone();
            parser.on_thrown(Box::new(move |_| total.inc()));
        }

        Ok(Self { total })
    }
}

impl MetricProducer for ExceptionProducer {
    fn name(&self) -> &'static str {
        "exceptions"
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.total.clone()))?;
        Ok(())
    }
}
