//! In-memory playback queue.
//!
//! The queue owns its list of [`Item`]s and a cursor. It performs no I/O and
//! holds no locks: it is meant to be owned by a single task (the stream
//! orchestrator) and mutated only from there.
//!
//! Cursor invariant: `current_index < len()` whenever the queue is non-empty,
//! and `current_index == 0` when it is empty.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Item;

/// Serializable copy of the queue state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub items: Vec<Item>,
    pub current_index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    items: Vec<Item>,
    current_index: usize,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes a read-only view of the underlying items.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cursor position, `None` when the queue is empty.
    pub fn current_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.current_index)
    }

    /// Appends an item at the end of the queue.
    pub fn add(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Replaces the item carrying the same id, in place.
    ///
    /// Returns `false` (and leaves the queue untouched) if no item matches.
    pub fn update(&mut self, item: Item) -> bool {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Removes an item by id and keeps the cursor in range.
    ///
    /// Removing an item before the cursor shifts the cursor back so the same
    /// item stays current. Removing the current item moves the cursor onto the
    /// following one (or the new last item).
    pub fn remove(&mut self, id: Uuid) -> Option<Item> {
        let pos = self.position(id)?;
        let removed = self.items.remove(pos);

        if self.items.is_empty() {
            self.current_index = 0;
        } else if pos < self.current_index {
            self.current_index -= 1;
        } else if self.current_index >= self.items.len() {
            self.current_index = self.items.len() - 1;
        }

        Some(removed)
    }

    /// Advances the cursor. Returns `None` at the end of the queue, leaving
    /// the cursor where it was.
    pub fn next(&mut self) -> Option<&Item> {
        if self.current_index + 1 < self.items.len() {
            self.current_index += 1;
            self.items.get(self.current_index)
        } else {
            None
        }
    }

    /// Moves the cursor back. Returns `None` at the head of the queue.
    pub fn previous(&mut self) -> Option<&Item> {
        if self.current_index > 0 && !self.items.is_empty() {
            self.current_index -= 1;
            self.items.get(self.current_index)
        } else {
            None
        }
    }

    pub fn current(&self) -> Option<&Item> {
        self.items.get(self.current_index)
    }

    pub fn has_next(&self) -> bool {
        self.current_index + 1 < self.items.len()
    }

    pub fn get(&self, id: Uuid) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    /// Makes an existing item current.
    pub fn select(&mut self, id: Uuid) -> Option<&Item> {
        let pos = self.position(id)?;
        self.current_index = pos;
        self.items.get(pos)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
            current_index: self.current_index(),
        }
    }
}
