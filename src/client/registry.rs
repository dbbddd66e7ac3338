//! Registry of in-flight exchanges.
//!
//! The registry is written from two directions at once: request-issuing threads
//! insert, and transport I/O threads remove on terminal transitions. `stop()`
//! closes, snapshots and drains it. All access goes through one
//! `parking_lot::RwLock`, so a terminal transition racing with a drain simply
//! finds the entry gone, and an insert racing with `close` either lands before
//! it or is refused.

use crate::client::exchange::{Exchange, ExchangeId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Entries {
    exchanges: HashMap<ExchangeId, Arc<Exchange>>,
    closed: bool,
}

/// Thread-safe map of outstanding exchanges keyed by identity.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: RwLock<Entries>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Track an exchange; returns `false` once the registry is closed.
    pub(crate) fn insert(&self, exchange: Arc<Exchange>) -> bool {
        let mut entries = self.entries.write();
        if entries.closed {
            return false;
        }
        entries.exchanges.insert(exchange.id(), exchange);
        true
    }

    /// Remove an exchange; a missing identity is a no-op.
    pub(crate) fn remove(&self, id: &ExchangeId) -> Option<Arc<Exchange>> {
        self.entries.write().exchanges.remove(id)
    }

    pub(crate) fn contains(&self, id: &ExchangeId) -> bool {
        self.entries.read().exchanges.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().exchanges.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().exchanges.is_empty()
    }

    /// Refuse every later insert. Entries already tracked stay.
    pub(crate) fn close(&self) {
        self.entries.write().closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.entries.read().closed
    }

    /// Outstanding exchanges, without removing them
    pub(crate) fn snapshot(&self) -> Vec<Arc<Exchange>> {
        self.entries.read().exchanges.values().cloned().collect()
    }

    /// Remove and return everything still outstanding
    pub(crate) fn drain(&self) -> Vec<Arc<Exchange>> {
        self.entries
            .write()
            .exchanges
            .drain()
            .map(|(_, exchange)| exchange)
            .collect()
    }
}
