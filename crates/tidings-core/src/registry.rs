//! Ordered handler registry.
//!
//! The registry is a plain `Vec` in registration order. It carries no locking
//! of its own; the dispatcher guards it with a single mutex so that a dispatch
//! scan and a subscription change never interleave.

use crate::handler::{BoxedHandler, HandlerId, ParamType};

/// A validated registration.
pub(crate) struct Entry {
    pub(crate) id: HandlerId,
    pub(crate) parameter: ParamType,
    pub(crate) handler: BoxedHandler,
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Removes every entry with the given identity, keeping the rest in order.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn remove(&mut self, id: HandlerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before - self.entries.len()
    }

    /// Entries whose parameter type is exactly `value_type`, in registration order.
    pub(crate) fn matching(&self, value_type: ParamType) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(move |entry| entry.parameter == value_type)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
