//! Event identities and the decoded event representation.

use std::fmt;

/// Maximum payload slots one event may carry on the wire.
pub const MAX_PAYLOAD_SLOTS: usize = 16;

/// Highest event id the agent recognizes, used to size dispatch tables.
pub const MAX_EVENT_ID: usize = 145;

/// Identifies the kind of runtime instrumentation event. Values match
/// the event ids emitted by the runtime provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventId {
    GcStart = 1,
    GcEnd = 2,
    GcRestartEeEnd = 3,
    GcHeapStats = 4,
    GcSuspendEeBegin = 9,
    GcAllocationTick = 10,
    IoThreadCreate = 44,
    IoThreadTerminate = 45,
    IoThreadRetire = 46,
    IoThreadUnretire = 47,
    ThreadPoolAdjustment = 55,
    ExceptionThrown = 80,
    ContentionStart = 81,
    ContentionStop = 91,
    MethodLoadVerbose = 143,
    MethodJitStart = 145,
}

impl EventId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GcStart => "gc_start",
            Self::GcEnd => "gc_end",
            Self::GcRestartEeEnd => "gc_restart_ee_end",
            Self::GcHeapStats => "gc_heap_stats",
            Self::GcSuspendEeBegin => "gc_suspend_ee_begin",
            Self::GcAllocationTick => "gc_allocation_tick",
            Self::IoThreadCreate => "io_thread_create",
            Self::IoThreadTerminate => "io_thread_terminate",
            Self::IoThreadRetire => "io_thread_retire",
            Self::IoThreadUnretire => "io_thread_unretire",
            Self::ThreadPoolAdjustment => "threadpool_adjustment",
            Self::ExceptionThrown => "exception_thrown",
            Self::ContentionStart => "contention_start",
            Self::ContentionStop => "contention_stop",
            Self::MethodLoadVerbose => "method_load_verbose",
            Self::MethodJitStart => "method_jit_start",
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::GcStart),
            2 => Some(Self::GcEnd),
            3 => Some(Self::GcRestartEeEnd),
            4 => Some(Self::GcHeapStats),
            9 => Some(Self::GcSuspendEeBegin),
            10 => Some(Self::GcAllocationTick),
            44 => Some(Self::IoThreadCreate),
            45 => Some(Self::IoThreadTerminate),
            46 => Some(Self::IoThreadRetire),
            47 => Some(Self::IoThreadUnretire),
            55 => Some(Self::ThreadPoolAdjustment),
            80 => Some(Self::ExceptionThrown),
            81 => Some(Self::ContentionStart),
            91 => Some(Self::ContentionStop),
            143 => Some(Self::MethodLoadVerbose),
            145 => Some(Self::MethodJitStart),
            _ => None,
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::GcStart,
            Self::GcEnd,
            Self::GcRestartEeEnd,
            Self::GcHeapStats,
            Self::GcSuspendEeBegin,
            Self::GcAllocationTick,
            Self::IoThreadCreate,
            Self::IoThreadTerminate,
            Self::IoThreadRetire,
            Self::IoThreadUnretire,
            Self::ThreadPoolAdjustment,
            Self::ExceptionThrown,
            Self::ContentionStart,
            Self::ContentionStop,
            Self::MethodLoadVerbose,
            Self::MethodJitStart,
        ]
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded instrumentation event.
///
/// Payload slots are unsigned 64-bit values in provider order; narrower
/// provider fields arrive widened and are narrowed again by accessors.
/// The payload is stored inline so decoding never allocates.
#[derive(Debug, Clone, Copy)]
pub struct RawEvent {
    pub timestamp_ns: u64,
    pub thread_id: u64,
    pub pid: u32,
    pub event_id: u16,
    payload_len: u8,
    payload: [u64; MAX_PAYLOAD_SLOTS],
}

impl RawEvent {
    pub fn new(
        event_id: u16,
        timestamp_ns: u64,
        thread_id: u64,
        pid: u32,
        payload: &[u64],
    ) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SLOTS);
        let len = payload.len().min(MAX_PAYLOAD_SLOTS);
        let mut slots = [0u64; MAX_PAYLOAD_SLOTS];
        slots[..len].copy_from_slice(&payload[..len]);
        Self {
            timestamp_ns,
            thread_id,
            pid,
            event_id,
            payload_len: len as u8,
            payload: slots,
        }
    }

    /// Payload slots carried by this event.
    pub fn payload(&self) -> &[u64] {
        &self.payload[..self.payload_len as usize]
    }

    /// Read payload slot `idx`, if present.
    pub fn slot(&self, idx: usize) -> Option<u64> {
        self.payload().get(idx).copied()
    }

    /// Read payload slot `idx` narrowed to the provider's u32 width.
    pub fn slot_u32(&self, idx: usize) -> Option<u32> {
        self.slot(idx).map(|v| v as u32)
    }
}

/// Why a garbage collection was triggered. Discriminants match the
/// provider's reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GcReason {
    AllocSmall = 0,
    Induced = 1,
    LowMemory = 2,
    Empty = 3,
    AllocLarge = 4,
    OutOfSpaceSoh = 5,
    OutOfSpaceLoh = 6,
    InducedNotForced = 7,
    Internal = 8,
    InducedLowMemory = 9,
    InducedCompacting = 10,
    LowMemoryHost = 11,
    PmFullGc = 12,
    LowMemoryHostBlocking = 13,
}

impl GcReason {
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::AllocSmall => "alloc_small",
            Self::Induced => "induced",
            Self::LowMemory => "low_memory",
            Self::Empty => "empty",
            Self::AllocLarge => "alloc_large",
            Self::OutOfSpaceSoh => "out_of_space_soh",
            Self::OutOfSpaceLoh => "out_of_space_loh",
            Self::InducedNotForced => "induced_not_forced",
            Self::Internal => "internal",
            Self::InducedLowMemory => "induced_low_memory",
            Self::InducedCompacting => "induced_compacting",
            Self::LowMemoryHost => "low_memory_host",
            Self::PmFullGc => "pm_full_gc",
            Self::LowMemoryHostBlocking => "low_memory_host_blocking",
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::AllocSmall),
            1 => Some(Self::Induced),
            2 => Some(Self::LowMemory),
            3 => Some(Self::Empty),
            4 => Some(Self::AllocLarge),
            5 => Some(Self::OutOfSpaceSoh),
            6 => Some(Self::OutOfSpaceLoh),
            7 => Some(Self::InducedNotForced),
            8 => Some(Self::Internal),
            9 => Some(Self::InducedLowMemory),
            10 => Some(Self::InducedCompacting),
            11 => Some(Self::LowMemoryHost),
            12 => Some(Self::PmFullGc),
            13 => Some(Self::LowMemoryHostBlocking),
            _ => None,
        }
    }

    /// Metric label for a possibly-unknown reason code.
    pub fn label_for(v: u32) -> &'static str {
        Self::from_u32(v).map_or("other", Self::as_label)
    }
}

/// Collection flavor reported by the start event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GcType {
    NonConcurrent = 0,
    Background = 1,
    Foreground = 2,
}

impl GcType {
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::NonConcurrent => "non_concurrent_gc",
            Self::Background => "background_gc",
            Self::Foreground => "foreground_gc",
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::NonConcurrent),
            1 => Some(Self::Background),
            2 => Some(Self::Foreground),
            _ => None,
        }
    }

    pub fn label_for(v: u32) -> &'static str {
        Self::from_u32(v).map_or("other", Self::as_label)
    }
}

/// Why the thread pool changed its worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadAdjustmentReason {
    Warmup = 0,
    Initializing = 1,
    RandomMove = 2,
    ClimbingMove = 3,
    ChangePoint = 4,
    Stabilizing = 5,
    Starvation = 6,
    ThreadTimedOut = 7,
}

impl ThreadAdjustmentReason {
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Initializing => "initializing",
            Self::RandomMove => "random_move",
            Self::ClimbingMove => "climbing_move",
            Self::ChangePoint => "change_point",
            Self::Stabilizing => "stabilizing",
            Self::Starvation => "starvation",
            Self::ThreadTimedOut => "thread_timed_out",
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Warmup),
            1 => Some(Self::Initializing),
            2 => Some(Self::RandomMove),
            3 => Some(Self::ClimbingMove),
            4 => Some(Self::ChangePoint),
            5 => Some(Self::Stabilizing),
            6 => Some(Self::Starvation),
            7 => Some(Self::ThreadTimedOut),
            _ => None,
        }
    }

    pub fn label_for(v: u32) -> &'static str {
        Self::from_u32(v).map_or("other", Self::as_label)
    }
}
