//! Garbage collection events: collections, execution-engine pauses,
//! heap statistics, and allocation ticks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::{EventParser, ObserverFn, Observers};
use crate::correlate::pair::{PairOutcome, PairTimer};
use crate::correlate::sampling::SampleEvery;
use crate::ingest::event::{EventId, RawEvent};
use crate::ingest::stats::IngestStats;

/// SuspendForGC (0x1) and SuspendForGCPrep (0x6); other suspension
/// reasons are not collection pauses.
const SUSPEND_GC_REASONS: u32 = 0x1 | 0x6;

/// Allocation tick flag bit marking a large-object-heap allocation.
const LOH_HEAP_FLAG: u32 = 0x1;

/// A garbage collection began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStartEvent {
    /// Monotonic collection number.
    pub number: u32,
    pub generation: u32,
    pub reason_raw: u32,
}

/// A garbage collection finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionCompleteEvent {
    pub generation: u32,
    pub gc_type_raw: u32,
    pub duration: Duration,
}

/// The execution engine resumed after a collection pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseCompleteEvent {
    pub duration: Duration,
}

/// Heap sizes sampled after a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStatsEvent {
    pub gen0_bytes: u64,
    pub gen1_bytes: u64,
    pub gen2_bytes: u64,
    pub loh_bytes: u64,
    pub finalization_queue_len: u64,
    pub pinned_objects: u32,
}

/// Roughly every 100KB of allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationTickEvent {
    pub bytes: u64,
    pub large_object_heap: bool,
}

/// Start-event fields carried through to the collection end.
#[derive(Debug, Clone, Copy)]
struct CollectionInfo {
    generation: u32,
    gc_type_raw: u32,
}

const GC_EVENT_IDS: &[EventId] = &[
    EventId::GcStart,
    EventId::GcEnd,
    EventId::GcRestartEeEnd,
    EventId::GcHeapStats,
    EventId::GcSuspendEeBegin,
    EventId::GcAllocationTick,
];

/// Correlates collection start/end pairs by collection number and
/// suspension/restart pairs by arrival order. Collections are rare
/// enough that neither pair is sampled.
pub struct GcParser {
    collections: PairTimer<u32, CollectionInfo>,
    pauses: PairTimer<u32>,
    stats: Arc<IngestStats>,
    collection_start: Observers<CollectionStartEvent>,
    collection_complete: Observers<CollectionCompleteEvent>,
    pause_complete: Observers<PauseCompleteEvent>,
    heap_stats: Observers<HeapStatsEvent>,
    allocation_tick: Observers<AllocationTickEvent>,
}

impl GcParser {
    pub fn new(ttl: Duration, capacity: usize, stats: Arc<IngestStats>) -> Result<Self> {
        Ok(Self {
            collections: PairTimer::with_data(
                EventId::GcStart as u16,
                EventId::GcEnd as u16,
                collection_number,
                collection_info,
                SampleEvery::One,
                ttl,
                capacity,
            )?,
            pauses: PairTimer::new(
                EventId::GcSuspendEeBegin as u16,
                EventId::GcRestartEeEnd as u16,
                // Suspensions and restarts alternate, so a constant key
                // pairs them.
                |_| 0u32,
                SampleEvery::One,
                ttl,
                capacity,
            )?,
            stats,
            collection_start: Observers::new(),
            collection_complete: Observers::new(),
            pause_complete: Observers::new(),
            heap_stats: Observers::new(),
            allocation_tick: Observers::new(),
        })
    }

    pub fn on_collection_start(&self, f: ObserverFn<CollectionStartEvent>) {
        self.collection_start.add(f);
    }

    pub fn on_collection_complete(&self, f: ObserverFn<CollectionCompleteEvent>) {
        self.collection_complete.add(f);
    }

    pub fn on_pause_complete(&self, f: ObserverFn<PauseCompleteEvent>) {
        self.pause_complete.add(f);
    }

    pub fn on_heap_stats(&self, f: ObserverFn<HeapStatsEvent>) {
        self.heap_stats.add(f);
    }

    pub fn on_allocation_tick(&self, f: ObserverFn<AllocationTickEvent>) {
        self.allocation_tick.add(f);
    }
}

fn collection_number(event: &RawEvent) -> u32 {
    event.slot_u32(0).unwrap_or(0)
}

fn collection_info(event: &RawEvent) -> CollectionInfo {
    CollectionInfo {
        generation: event.slot_u32(1).unwrap_or(0),
        gc_type_raw: event.slot_u32(3).unwrap_or(0),
    }
}

impl EventParser for GcParser {
    fn name(&self) -> &'static str {
        "gc"
    }

    fn event_ids(&self) -> &'static [EventId] {
        GC_EVENT_IDS
    }

    fn handle(&self, event: &RawEvent) {
        let id = event.event_id;

        if id == EventId::GcAllocationTick as u16 {
            let (Some(bytes), Some(flags)) = (event.slot(0), event.slot_u32(1)) else {
                self.stats.record_malformed();
                return;
            };
            self.allocation_tick.emit(&AllocationTickEvent {
                bytes,
                large_object_heap: flags & LOH_HEAP_FLAG == LOH_HEAP_FLAG,
            });
            return;
        }

        if id == EventId::GcHeapStats as u16 {
            let (Some(gen0), Some(gen1), Some(gen2), Some(loh), Some(finalization), Some(pinned)) = (
                event.slot(0),
                event.slot(2),
                event.slot(4),
                event.slot(6),
                event.slot(9),
                event.slot_u32(10),
            ) else {
                self.stats.record_malformed();
                return;
            };
            self.heap_stats.emit(&HeapStatsEvent {
                gen0_bytes: gen0,
                gen1_bytes: gen1,
                gen2_bytes: gen2,
                loh_bytes: loh,
                finalization_queue_len: finalization,
                pinned_objects: pinned,
            });
            return;
        }

        if id == EventId::GcSuspendEeBegin as u16 {
            let Some(reason) = event.slot_u32(0) else {
                self.stats.record_malformed();
                return;
            };
            if reason & SUSPEND_GC_REASONS == 0 {
                return;
            }
        }

        if let (PairOutcome::FinalWithDuration, duration, _) = self.pauses.observe(event) {
            self.pause_complete.emit(&PauseCompleteEvent { duration });
            return;
        }

        if id == EventId::GcStart as u16 {
            let (Some(number), Some(generation), Some(reason_raw), Some(_)) = (
                event.slot_u32(0),
                event.slot_u32(1),
                event.slot_u32(2),
                event.slot(3),
            ) else {
                self.stats.record_malformed();
                return;
            };
            self.collection_start.emit(&CollectionStartEvent {
                number,
                generation,
                reason_raw,
            });
        }

        if id == EventId::GcEnd as u16 && event.slot(0).is_none() {
            self.stats.record_malformed();
            return;
        }

        if let (PairOutcome::FinalWithDuration, duration, Some(info)) =
            self.collections.observe(event)
        {
            self.collection_complete.emit(&CollectionCompleteEvent {
                generation: info.generation,
                gc_type_raw: info.gc_type_raw,
                duration,
            });
        }
    }

    fn close(&self) {
        self.collections.close();
        self.pauses.close();
    }
}
