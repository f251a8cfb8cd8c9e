//! Listener management for materialized views.
//!
//! This module provides listener IDs and a manager for tracking the
//! callbacks registered on a view.

use crate::entry::ViewValue;
use hashbrown::HashMap;
use std::rc::Rc;

/// Unique identifier for a listener.
pub type ListenerId = u64;

/// Callback invoked with the current view snapshot.
pub type Listener = Rc<dyn Fn(&ViewValue)>;

/// Manages the listeners of one view.
pub struct ListenerSet {
    /// Registered listeners
    listeners: HashMap<ListenerId, Listener>,
    /// Next listener ID to assign
    next_id: ListenerId,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers `listener`, returning the ID used to remove it.
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    /// Returns true if the listener was found and removed.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Listeners in registration order. Cloned out so callbacks may add or
    /// remove listeners while being notified.
    pub fn snapshot(&self) -> Vec<Listener> {
        let mut ids: Vec<_> = self.listeners.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.listeners.get(&id).cloned())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
