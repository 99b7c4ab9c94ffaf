//! Event dispatch: one replaceable callback slot per push-event kind.
//!
//! The dispatcher decouples "what arrived from the network" from "who
//! currently wants to handle it". Each [`EventKind`] has at most one
//! active handler — registering a new one replaces the old — and the
//! slot is resolved at dispatch time, never captured at registration
//! time, so a handler registered over a stale one can never fire.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use taskroom_proto::event::{EventKind, ServerEvent};

/// A registered push-event callback.
pub type Handler = Box<dyn FnMut(&ServerEvent) + Send>;

/// Single-slot registration table mapping event kinds to their current
/// handler.
#[derive(Default)]
pub struct EventDispatcher {
    /// Handlers are individually wrapped so a slot can be resolved under
    /// the table lock but invoked outside it; a handler that registers
    /// new handlers does not deadlock the table.
    slots: Mutex<HashMap<EventKind, Arc<Mutex<Handler>>>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher with no handlers registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any previous handler.
    pub fn set_handler<F>(&self, kind: EventKind, handler: F)
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        self.slots
            .lock()
            .insert(kind, Arc::new(Mutex::new(Box::new(handler))));
    }

    /// Removes the handler for `kind`, if any.
    pub fn clear_handler(&self, kind: EventKind) {
        self.slots.lock().remove(&kind);
    }

    /// Dispatches `event` to the currently registered handler for its
    /// kind, or does nothing if none is registered.
    ///
    /// Protocol `error` events are logged here and never reach a user
    /// slot; the session layer records them separately. A panicking
    /// handler is contained and logged — it never unwinds past the
    /// dispatcher boundary.
    pub fn dispatch(&self, event: &ServerEvent) {
        if let ServerEvent::Error { message } = event {
            tracing::warn!(message = %message, "server reported an error");
            return;
        }

        let Some(kind) = event.callback_kind() else {
            return;
        };

        // Resolve the slot now, not at registration time.
        let slot = self.slots.lock().get(&kind).cloned();
        let Some(slot) = slot else {
            tracing::trace!(?kind, "no handler registered, dropping event");
            return;
        };

        let mut handler = slot.lock();
        if catch_unwind(AssertUnwindSafe(|| (*handler)(event))).is_err() {
            tracing::error!(?kind, "event handler panicked");
        }
    }
}
