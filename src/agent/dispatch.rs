use std::sync::Arc;

use tracing::debug;

use crate::ingest::event::{RawEvent, MAX_EVENT_ID};
use crate::parsers::EventParser;

/// Routes raw events to the parsers registered for their event id.
///
/// The table is dense and built once at startup, so dispatch is an
/// index lookup with no locking. Parsers sharing an id run in
/// registration order.
pub struct Dispatcher {
    routes: Vec<Vec<Arc<dyn EventParser>>>,
    parsers: Vec<Arc<dyn EventParser>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            routes: vec![Vec::new(); MAX_EVENT_ID + 1],
            parsers: Vec::new(),
        }
    }

    /// Register a parser under every event id it declares.
    pub fn register(&mut self, parser: Arc<dyn EventParser>) {
        for id in parser.event_ids() {
            let idx = *id as usize;
            if let Some(route) = self.routes.get_mut(idx) {
                route.push(Arc::clone(&parser));
            }
        }
        debug!(
            parser = parser.name(),
            ids = parser.event_ids().len(),
            "parser registered"
        );
        self.parsers.push(parser);
    }

    /// Feed one event to every parser registered for its id. Returns
    /// false when nothing consumed it.
    pub fn dispatch(&self, event: &RawEvent) -> bool {
        let Some(route) = self.routes.get(event.event_id as usize) else {
            return false;
        };
        for parser in route {
            parser.handle(event);
        }
        !route.is_empty()
    }

    /// Parsers in registration order.
    pub fn parsers(&self) -> &[Arc<dyn EventParser>] {
        &self.parsers
    }

    /// Release every parser's correlation resources.
    pub fn close(&self) {
        for parser in &self.parsers {
            parser.close();
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
