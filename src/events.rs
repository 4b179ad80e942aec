//! Events sent to the presentation layer.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::dispatcher::SessionId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// The trigger hotkey was pressed while idle.
    HotkeyTriggered,
    TypingProgress {
        session: SessionId,
        progress: f64,
        current: usize,
        total: usize,
    },
    TypingComplete {
        session: SessionId,
    },
    /// The loop observed cancellation before emitting character `index`.
    TypingStopped {
        session: SessionId,
        index: usize,
    },
    /// Cancellation was requested; a `TypingStopped` follows once the loop notices.
    TypingCancelled {
        session: SessionId,
    },
    TypingError {
        message: String,
    },
    HotkeyError {
        key: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sends `event`, ignoring a dropped receiver.
pub(crate) fn emit(events: &EventSender, event: Event) {
    if events.send(event).is_err() {
        tracing::trace!("event receiver dropped");
    }
}
