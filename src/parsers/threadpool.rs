//! Thread pool sizing events.

use std::sync::Arc;

use super::{EventParser, ObserverFn, Observers};
use crate::ingest::event::{EventId, RawEvent};
use crate::ingest::stats::IngestStats;

/// The worker pool changed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPoolAdjustedEvent {
    pub thread_count: u32,
    pub reason_raw: u32,
}

/// The IO completion pool changed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoThreadAdjustedEvent {
    pub thread_count: u32,
}

const THREADPOOL_EVENT_IDS: &[EventId] = &[
    EventId::ThreadPoolAdjustment,
    EventId::IoThreadCreate,
    EventId::IoThreadTerminate,
    EventId::IoThreadRetire,
    EventId::IoThreadUnretire,
];

/// Stateless parser; every event carries the pool's new absolute size.
pub struct ThreadPoolParser {
    stats: Arc<IngestStats>,
    adjusted: Observers<ThreadPoolAdjustedEvent>,
    io_adjusted: Observers<IoThreadAdjustedEvent>,
}

impl ThreadPoolParser {
    pub fn new(stats: Arc<IngestStats>) -> Self {
        Self {
            stats,
            adjusted: Observers::new(),
            io_adjusted: Observers::new(),
        }
    }

    pub fn on_adjusted(&self, f: ObserverFn<ThreadPoolAdjustedEvent>) {
        self.adjusted.add(f);
    }

    pub fn on_io_adjusted(&self, f: ObserverFn<IoThreadAdjustedEvent>) {
        self.io_adjusted.add(f);
    }
}

impl EventParser for ThreadPoolParser {
    fn name(&self) -> &'static str {
        "threadpool"
    }

    fn event_ids(&self) -> &'static [EventId] {
        THREADPOOL_EVENT_IDS
    }

    fn handle(&self, event: &RawEvent) {
        match EventId::from_u16(event.event_id) {
            Some(EventId::ThreadPoolAdjustment) => {
                let (Some(thread_count), Some(reason_raw)) =
                    (event.slot_u32(1), event.slot_u32(2))
                else {
                    self.stats.record_malformed();
                    return;
                };
                self.adjusted.emit(&ThreadPoolAdjustedEvent {
                    thread_count,
                    reason_raw,
                });
            }
            Some(
                EventId::IoThreadCreate
                | EventId::IoThreadTerminate
                | EventId::IoThreadRetire
                | EventId::IoThreadUnretire,
            ) => {
                let Some(thread_count) = event.slot_u32(0) else {
                    self.stats.record_malformed();
                    return;
                };
                self.io_adjusted.emit(&IoThreadAdjustedEvent { thread_count });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn parser() -> (ThreadPoolParser, Arc<IngestStats>) {
        let stats = Arc::new(IngestStats::new());
        (ThreadPoolParser::new(Arc::clone(&stats)), stats)
    }

    fn event(id: EventId, payload: &[u64]) -> RawEvent {
        RawEvent::new(id as u16, 0, 7, 100, payload)
    }

    #[test]
    fn test_worker_adjustment() {
        let (parser, _) = parser();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let sink = Arc::clone(&seen);
            parser.on_adjusted(Box::new(move |e| sink.lock().push(*e)));
        }

        // Slot 0 is the average throughput, unused here.
        parser.handle(&event(EventId::ThreadPoolAdjustment, &[0, 12, 3]));

        assert_eq!(
            *seen.lock(),
            vec![ThreadPoolAdjustedEvent { thread_count: 12, reason_raw: 3 }]
        );
    }

    #[test]
    fn test_io_pool_events_carry_new_size() {
        let (parser, _) = parser();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let sink = Arc::clone(&seen);
            parser.on_io_adjusted(Box::new(move |e| sink.lock().push(*e)));
        }

        parser.handle(&event(EventId::IoThreadCreate, &[4, 0]));
        parser.handle(&event(EventId::IoThreadRetire, &[3, 0]));
        parser.handle(&event(EventId::IoThreadUnretire, &[4, 0]));
        parser.handle(&event(EventId::IoThreadTerminate, &[2, 0]));

        let counts: Vec<u32> = seen.lock().iter().map(|e| e.thread_count).collect();
        assert_eq!(counts, vec![4, 3, 4, 2]);
    }

    #[test]
    fn test_short_payloads_counted() {
        let (parser, stats) = parser();

        parser.handle(&event(EventId::ThreadPoolAdjustment, &[0, 12]));
        parser.handle(&event(EventId::IoThreadCreate, &[]));

        assert_eq!(stats.snapshot().malformed_events, 2);
    }
}
