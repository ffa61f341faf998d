//! Change notification plumbing.
//!
//! Models notify observers through an [`EventBus`] keyed by event kind. Each
//! kind has at most one active listener: registering a new listener for a kind
//! replaces the previous one instead of fanning out.

use std::collections::HashMap;
use std::hash::Hash;

/// Whether observers must rebuild their input widgets after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHint {
    /// Cheap redraw only (keystrokes, drag frames); widgets are left alone
    Incremental,
    /// Finalized edit; widgets must be resynchronized with the model
    Full,
}

/// An event that can be dispatched through an [`EventBus`].
pub trait BusEvent {
    /// Discriminant used to look up the listener
    type Kind: Copy + Eq + Hash;

    /// Returns the kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Boxed listener callback.
pub type Listener<E> = Box<dyn FnMut(&E)>;

/// Single-listener-per-kind dispatcher.
pub struct EventBus<E: BusEvent> {
    listeners: HashMap<E::Kind, Listener<E>>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<E: BusEvent> EventBus<E> {
    /// Creates a bus without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kind`, replacing any previous listener.
    ///
    /// Returns `true` if a listener was replaced.
    pub fn on(&mut self, kind: E::Kind, listener: impl FnMut(&E) + 'static) -> bool {
        self.listeners.insert(kind, Box::new(listener)).is_some()
    }

    /// Removes the listener for `kind`.
    pub fn off(&mut self, kind: E::Kind) -> bool {
        self.listeners.remove(&kind).is_some()
    }

    /// Delivers `event` to the listener registered for its kind, if any.
    pub fn emit(&mut self, event: E) {
        if let Some(listener) = self.listeners.get_mut(&event.kind()) {
            listener(&event);
        }
    }

    /// Whether a listener is registered for `kind`.
    pub fn has_listener(&self, kind: E::Kind) -> bool {
        self.listeners.contains_key(&kind)
    }
}

impl<E: BusEvent> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
