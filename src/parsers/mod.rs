//! Translate raw provider events into typed subsystem callbacks.

pub mod contention;
pub mod exceptions;
pub mod gc;
pub mod jit;
pub mod threadpool;

use parking_lot::Mutex;

use crate::ingest::event::{EventId, RawEvent};

/// Callback invoked with a typed subsystem event.
pub type ObserverFn<E> = Box<dyn Fn(&E) + Send + Sync>;

/// A subsystem parser: declares the event ids it consumes and turns
/// raw events into typed observer callbacks.
pub trait EventParser: Send + Sync {
    /// Parser name for logs and the collector table.
    fn name(&self) -> &'static str;

    /// Event ids this parser consumes.
    fn event_ids(&self) -> &'static [EventId];

    /// Process one raw event. Events with ids outside `event_ids` are
    /// ignored.
    fn handle(&self, event: &RawEvent);

    /// Release correlation resources. Safe to call more than once.
    fn close(&self) {}
}

/// Observer list invoked in registration order.
pub(crate) struct Observers<E> {
    callbacks: Mutex<Vec<ObserverFn<E>>>,
}

impl<E> Observers<E> {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::with_capacity(4)),
        }
    }

    pub(crate) fn add(&self, callback: ObserverFn<E>) {
        self.callbacks.lock().push(callback);
    }

    pub(crate) fn emit(&self, event: &E) {
        let callbacks = self.callbacks.lock();
        for callback in callbacks.iter() {
            callback(event);
        }
    }
}
