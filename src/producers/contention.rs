//! Lock contention metrics.

use anyhow::Result;
use prometheus::{Counter, Opts, Registry};

use super::{MetricProducer, RUNTIME_NAMESPACE};
use crate::parsers::contention::ContentionParser;

pub struct ContentionProducer {
    total: Counter,
    seconds_total: Counter,
}

impl ContentionProducer {
    pub fn new(parser: &ContentionParser) -> Result<Self> {
        let total = Counter::with_opts(
            Opts::new(
                "contention_total",
                "The number of locks contended",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;
        let seconds_total = Counter::with_opts(
            Opts::new(
                "contention_seconds_total",
                "The total amount of time spent contending locks",
            )
            .namespace(RUNTIME_NAMESPACE),
        )?;

        // Each tracked pair stands in for `divisor` real contentions.
        let divisor = parser.sample_every().divisor() as f64;
        {
            let total = total.clone();
            let seconds_total = seconds_total.clone();
            parser.on_end(Box::new(move |e| {
                total.inc_by(divisor);
                seconds_total.inc_by(divisor * e.duration.as_secs_f64());
            }));
        }

        Ok(Self {
            total,
            seconds_total,
        })
    }
}

impl MetricProducer for ContentionProducer {
    fn name(&self) -> &'static str {
        "contention"
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.total.clone()))?;
        registry.register(Box::new(self.seconds_total.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::correlate::sampling::SampleEvery;
    use crate::ingest::event::{EventId, RawEvent};
    use crate::parsers::EventParser;

    const MS: u64 = 1_000_000;

    fn event(id: EventId, timestamp_ns: u64, thread_id: u64) -> RawEvent {
        RawEvent::new(id as u16, timestamp_ns, thread_id, 100, &[])
    }

    #[tokio::test]
    async fn test_unsampled_totals() {
        let parser = Arc::new(
            ContentionParser::new(SampleEvery::One, Duration::from_secs(300), 64).unwrap(),
        );
        let producer = ContentionProducer::new(&parser).unwrap();

        parser.handle(&event(EventId::ContentionStart, 0, 1));
        parser.handle(&event(EventId::ContentionStop, 100 * MS, 1));

        assert_eq!(producer.total.get() as u64, 1);
        assert!((producer.seconds_total.get() - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sampled_totals_scaled_by_divisor() {
        let parser = Arc::new(
            ContentionParser::new(SampleEvery::Two, Duration::from_secs(300), 64).unwrap(),
        );
        let producer = ContentionProducer::new(&parser).unwrap();

        // Four pairs at 1-in-2: two carry durations, each counted
        // twice.
        for tid in 1..=4u64 {
            parser.handle(&event(EventId::ContentionStart, 0, tid));
            parser.handle(&event(EventId::ContentionStop, 100 * MS, tid));
        }

        assert_eq!(producer.total.get() as u64, 4);
        assert!((producer.seconds_total.get() - 0.4).abs() < 1e-9);
    }
}
