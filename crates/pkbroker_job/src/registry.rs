//! Per-job handler table, one slot per [`EventKind`].

use crate::event::{EventKind, JobEvent};
use crate::job::JobView;
use std::sync::Arc;

/// A handler invoked on the dispatch thread. State the handler needs is
/// captured by the closure.
pub type Handler = Arc<dyn Fn(&JobView, &JobEvent) + Send + Sync>;

#[derive(Default, Clone)]
struct Slot {
    enabled: bool,
    handler: Option<Handler>,
}

pub struct CallbackRegistry {
    slots: [Slot; EventKind::COUNT],
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// All slots start disabled.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
        }
    }

    /// Install `handler` for `kind`, replacing any previous one.
    pub fn set(&mut self, kind: EventKind, handler: Handler) {
        let slot = &mut self.slots[kind.index()];
        slot.enabled = true;
        slot.handler = Some(handler);
    }

    pub fn remove(&mut self, kind: EventKind) {
        self.slots[kind.index()] = Slot::default();
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        let slot = &self.slots[kind.index()];
        slot.enabled && slot.handler.is_some()
    }

    /// The current handler for `kind`, if enabled.
    pub fn handler(&self, kind: EventKind) -> Option<Handler> {
        let slot = &self.slots[kind.index()];
        if slot.enabled {
            slot.handler.clone()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::default();
        }
    }

    pub fn enabled_count(&self) -> usize {
        EventKind::ALL.iter().filter(|k| self.is_enabled(**k)).count()
    }
}
