//! Method compilation events.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::{EventParser, ObserverFn, Observers};
use crate::correlate::pair::{PairOutcome, PairTimer};
use crate::correlate::sampling::SampleEvery;
use crate::ingest::event::{EventId, RawEvent};
use crate::ingest::stats::IngestStats;

/// Bit 0 of the method flags marks a dynamically emitted method.
const METHOD_FLAG_DYNAMIC: u32 = 0x1;

/// A method finished compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationCompleteEvent {
    pub duration: Duration,
    pub dynamic: bool,
}

const JIT_EVENT_IDS: &[EventId] =
    &[EventId::MethodJitStart, EventId::MethodLoadVerbose];

/// Pairs compilation start with the method-load completion by method
/// id. Warmup can compile thousands of methods per second, so the pair
/// is usually sampled.
pub struct JitParser {
    compilations: PairTimer<u64>,
    stats: Arc<IngestStats>,
    complete: Observers<CompilationCompleteEvent>,
}

impl JitParser {
    pub fn new(
        sample_every: SampleEvery,
        ttl: Duration,
        capacity: usize,
        stats: Arc<IngestStats>,
    ) -> Result<Self> {
        Ok(Self {
            compilations: PairTimer::new(
                EventId::MethodJitStart as u16,
                EventId::MethodLoadVerbose as u16,
                method_id,
                sample_every,
                ttl,
                capacity,
            )?,
            stats,
            complete: Observers::new(),
        })
    }

    pub fn on_compilation_complete(&self, f: ObserverFn<CompilationCompleteEvent>) {
        self.complete.add(f);
    }

    /// Divisor applied when this parser's pairs were sampled.
    pub fn sample_every(&self) -> SampleEvery {
        self.compilations.sample_every()
    }
}

fn method_id(event: &RawEvent) -> u64 {
    event.slot(0).unwrap_or(0)
}

impl EventParser for JitParser {
    fn name(&self) -> &'static str {
        "jit"
    }

    fn event_ids(&self) -> &'static [EventId] {
        JIT_EVENT_IDS
    }

    fn handle(&self, event: &RawEvent) {
        let id = event.event_id;

        if id == EventId::MethodJitStart as u16 && event.slot(0).is_none() {
            self.stats.record_malformed();
            return;
        }
        // The method flags ride on the load event, not the start.
        if id == EventId::MethodLoadVerbose as u16
            && (event.slot(0).is_none() || event.slot(5).is_none())
        {
            self.stats.record_malformed();
            return;
        }

        if let (PairOutcome::FinalWithDuration, duration, _) =
            self.compilations.observe(event)
        {
            let flags = event.slot_u32(5).unwrap_or(0);
            self.complete.emit(&CompilationCompleteEvent {
                duration,
                dynamic: flags & METHOD_FLAG_DYNAMIC != 0,
            });
        }
    }

    fn close(&self) {
        self.compilations.close();
    }
}
