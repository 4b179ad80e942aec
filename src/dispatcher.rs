//! Typing dispatcher.
//!
//! At most one [`TypingSession`] runs at a time. Each session owns its own
//! cancellation flag and is identified by a [`SessionId`] generation, so a
//! stop request can only ever reach the session it was aimed at. The slot
//! for the active session is released by the session task itself once the
//! loop has finished, which means a new `start` is refused until the previous
//! loop has actually observed its cancellation.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{Result, TypeAssistError};
use crate::events::{emit, Event, EventSender};
use crate::keyboard::{KeyboardFactory, Keystrokes};
use crate::speed::Speed;

/// Generation number of a typing session, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub settle_delay: Duration,
    /// Upper bound of the random inter-character pause, as a fraction of the base delay.
    pub jitter_factor: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            jitter_factor: 0.3,
        }
    }
}

impl Timing {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            settle_delay: config.settle_delay,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Uniform on `[0, jitter_factor * base_delay)`.
    pub fn jitter(&self, base_delay: Duration) -> Duration {
        let upper = base_delay.as_secs_f64() * self.jitter_factor;
        if upper <= 0.0 {
            return Duration::ZERO;
        }
        let sample: f64 = rand::thread_rng().gen();
        Duration::from_secs_f64(sample * upper)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { typed: usize },
    Stopped { index: usize },
}

/// State of one run of the emission loop.
#[derive(Debug)]
pub struct TypingSession {
    id: SessionId,
    chars: Vec<char>,
    base_delay: Duration,
    index: usize,
    cancelled: Arc<AtomicBool>,
}

impl TypingSession {
    fn new(id: SessionId, text: &str, base_delay: Duration, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            id,
            chars: text.chars().collect(),
            base_delay,
            index: 0,
            cancelled,
        }
    }

    pub fn total(&self) -> usize {
        self.chars.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Percentage done once `current` characters have been emitted.
    pub fn progress(&self, current: usize) -> f64 {
        100.0 * current as f64 / self.total() as f64
    }
}

/// Handle to a running session.
///
/// Dropping the handle does not cancel the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Requests cancellation of this session only.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub async fn wait(self) -> Result<SessionOutcome> {
        self.join
            .await
            .map_err(|e| TypeAssistError::session(format!("session {} failed: {}", self.id, e)))
    }
}

/// A keystroke backend acquired ahead of a session.
pub struct ReadyKeyboard(Box<dyn Keystrokes>);

impl fmt::Debug for ReadyKeyboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyKeyboard").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    cancelled: Arc<AtomicBool>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveSession>>>;

pub struct Dispatcher {
    keyboard: KeyboardFactory,
    timing: Timing,
    events: EventSender,
    active: ActiveSlot,
    next_id: AtomicU64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timing", &self.timing)
            .field("active", &self.active)
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(keyboard: KeyboardFactory, timing: Timing, events: EventSender) -> Self {
        Self {
            keyboard,
            timing,
            events,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_typing(&self) -> bool {
        self.lock_active().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.lock_active()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.id))
    }

    /// Starts typing `text` into the focused window.
    ///
    /// Must be called from within a Tokio runtime; the session runs as a
    /// detached task and reports through the event channel.
    pub fn start(&self, text: &str, speed: Speed) -> Result<SessionHandle> {
        let keyboard = self.prepare()?;
        self.start_with(keyboard, text, speed)
    }

    /// Acquires a keystroke backend for the next session without starting it.
    ///
    /// Fails with `AlreadyTyping` while a session runs, and with
    /// `EngineUnavailable` (after emitting `typing-error`) when no backend
    /// can be created.
    pub fn prepare(&self) -> Result<ReadyKeyboard> {
        if let Some(session) = self.current_session() {
            tracing::debug!(session = %session, "Rejecting start while typing");
            return Err(TypeAssistError::AlreadyTyping { session });
        }

        match (self.keyboard)() {
            Ok(keyboard) => Ok(ReadyKeyboard(keyboard)),
            Err(e) => {
                tracing::error!(error = %e, "Keystroke engine unavailable");
                emit(
                    &self.events,
                    Event::TypingError {
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Starts a session on a backend obtained from [`prepare`](Self::prepare).
    pub fn start_with(&self, keyboard: ReadyKeyboard, text: &str, speed: Speed) -> Result<SessionHandle> {
        let mut slot = self.lock_active()?;
        if let Some(active) = slot.as_ref() {
            tracing::debug!(session = %active.id, "Rejecting start while typing");
            return Err(TypeAssistError::AlreadyTyping { session: active.id });
        }

        let mut keyboard = keyboard.0;
        let base_delay = speed.base_delay();
        keyboard.set_auto_delay(base_delay);

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let cancelled = Arc::new(AtomicBool::new(false));
        *slot = Some(ActiveSession {
            id,
            cancelled: Arc::clone(&cancelled),
        });
        drop(slot);

        let session = TypingSession::new(id, text, base_delay, Arc::clone(&cancelled));
        tracing::info!(
            session = %id,
            chars = session.total(),
            speed = %speed,
            "Typing session started"
        );

        let join = tokio::spawn(run_session(
            session,
            keyboard,
            self.timing,
            self.events.clone(),
            Arc::clone(&self.active),
        ));

        Ok(SessionHandle {
            id,
            cancelled,
            join,
        })
    }

    /// Requests cancellation of whatever session is running.
    ///
    /// Returns immediately with the targeted session, or `None` when idle.
    pub fn stop(&self) -> Result<Option<SessionId>> {
        let slot = self.lock_active()?;
        let Some(active) = slot.as_ref() else {
            return Ok(None);
        };
        Ok(Some(self.cancel_active(active)))
    }

    /// Like [`stop`](Self::stop) but only if `id` is still the running session.
    pub fn stop_session(&self, id: SessionId) -> Result<bool> {
        let slot = self.lock_active()?;
        match slot.as_ref() {
            Some(active) if active.id == id => {
                self.cancel_active(active);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn cancel_active(&self, active: &ActiveSession) -> SessionId {
        if !active.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!(session = %active.id, "Cancellation requested");
            emit(&self.events, Event::TypingCancelled { session: active.id });
        }
        active.id
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveSession>>> {
        self.active
            .lock()
            .map_err(|e| TypeAssistError::session(format!("session lock poisoned: {}", e)))
    }
}

async fn run_session(
    mut session: TypingSession,
    mut keyboard: Box<dyn Keystrokes>,
    timing: Timing,
    events: EventSender,
    active: ActiveSlot,
) -> SessionOutcome {
    tokio::time::sleep(timing.settle_delay).await;

    let outcome = emit_all(&mut session, keyboard.as_mut(), &timing, &events).await;

    match outcome {
        SessionOutcome::Completed { typed } => {
            tracing::info!(session = %session.id, typed, "Typing complete");
            emit(&events, Event::TypingComplete { session: session.id });
        }
        SessionOutcome::Stopped { index } => {
            tracing::info!(session = %session.id, index, "Typing stopped");
            emit(
                &events,
                Event::TypingStopped {
                    session: session.id,
                    index,
                },
            );
        }
    }

    release(&active, session.id);
    outcome
}

async fn emit_all(
    session: &mut TypingSession,
    keyboard: &mut dyn Keystrokes,
    timing: &Timing,
    events: &EventSender,
) -> SessionOutcome {
    let total = session.total();

    while session.index < total {
        if session.is_cancelled() {
            return SessionOutcome::Stopped {
                index: session.index,
            };
        }

        let ch = session.chars[session.index];
        if let Err(e) = keyboard.type_char(ch) {
            tracing::warn!(session = %session.id, index = session.index, error = %e, "Failed to type character");
        }
        let auto_delay = keyboard.auto_delay();
        if !auto_delay.is_zero() {
            tokio::time::sleep(auto_delay).await;
        }

        session.index += 1;
        let current = session.index;
        emit(
            events,
            Event::TypingProgress {
                session: session.id,
                progress: session.progress(current),
                current,
                total,
            },
        );

        tokio::time::sleep(timing.jitter(session.base_delay)).await;
    }

    SessionOutcome::Completed { typed: total }
}

fn release(active: &ActiveSlot, id: SessionId) {
    match active.lock() {
        Ok(mut slot) => {
            if slot.as_ref().map(|s| s.id) == Some(id) {
                *slot = None;
            }
        }
        Err(e) => tracing::error!(session = %id, error = %e, "Could not release session slot"),
    }
}
