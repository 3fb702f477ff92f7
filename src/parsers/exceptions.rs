//! Exception events.

use super::{EventParser, ObserverFn, Observers};
use crate::ingest::event::{EventId, RawEvent};

/// An exception was thrown. The wire format carries no type name, so
/// the event is a bare marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionThrownEvent;

const EXCEPTION_EVENT_IDS: &[EventId] = &[EventId::ExceptionThrown];

pub struct ExceptionParser {
    thrown: Observers<ExceptionThrownEvent>,
}

impl ExceptionParser {
    pub fn new() -> Self {
        Self {
            thrown: Observers::new(),
        }
    }

    pub fn on_thrown(&self, f: ObserverFn<ExceptionThrownEvent>) {
        self.thrown.add(f);
    }
}

impl Default for ExceptionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser for ExceptionParser {
    fn name(&self) -> &'static str {
        "exceptions"
    }

    fn event_ids(&self) -> &'static [EventId] {
        EXCEPTION_EVENT_IDS
    }

    fn handle(&self, event: &RawEvent) {
        if event.event_id == EventId::ExceptionThrown as u16 {
            self.thrown.emit(&ExceptionThrownEvent);
        }
    }
}
