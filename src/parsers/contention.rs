//! Monitor lock contention events.

use std::time::Duration;

use anyhow::Result;

use super::{EventParser, ObserverFn, Observers};
use crate::correlate::pair::{PairOutcome, PairTimer};
use crate::correlate::sampling::SampleEvery;
use crate::ingest::event::{EventId, RawEvent};

/// A thread started waiting on a contended monitor lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionStartEvent;

/// A thread acquired a contended monitor lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionEndEvent {
    pub duration: Duration,
}

const CONTENTION_EVENT_IDS: &[EventId] =
    &[EventId::ContentionStart, EventId::ContentionStop];

/// Pairs contention start/stop by the waiting thread's id. Contention
/// can fire at very high rates, so the pair is usually sampled.
pub struct ContentionParser {
    waits: PairTimer<u64>,
    start: Observers<ContentionStartEvent>,
    end: Observers<ContentionEndEvent>,
}

impl ContentionParser {
    pub fn new(sample_every: SampleEvery, ttl: Duration, capacity: usize) -> Result<Self> {
        Ok(Self {
            waits: PairTimer::new(
                EventId::ContentionStart as u16,
                EventId::ContentionStop as u16,
                |e| e.thread_id,
                sample_every,
                ttl,
                capacity,
            )?,
            start: Observers::new(),
            end: Observers::new(),
        })
    }

    pub fn on_start(&self, f: ObserverFn<ContentionStartEvent>) {
        self.start.add(f);
    }

    pub fn on_end(&self, f: ObserverFn<ContentionEndEvent>) {
        self.end.add(f);
    }

    /// Divisor applied when this parser's pairs were sampled.
    pub fn sample_every(&self) -> SampleEvery {
        self.waits.sample_every()
    }
}

impl EventParser for ContentionParser {
    fn name(&self) -> &'static str {
        "contention"
    }

    fn event_ids(&self) -> &'static [EventId] {
        CONTENTION_EVENT_IDS
    }

    fn handle(&self, event: &RawEvent) {
        match self.waits.observe(event) {
            (PairOutcome::Start, ..) => self.start.emit(&ContentionStartEvent),
            (PairOutcome::FinalWithDuration, duration, _) => {
                self.end.emit(&ContentionEndEvent { duration });
            }
            _ => {}
        }
    }

    fn close(&self) {
        self.waits.close();
    }
}
