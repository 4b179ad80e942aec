//! # TypeAssist
//!
//! Types user-supplied text into whichever application has focus when a
//! global hotkey is pressed, at a configurable pace and with cancellation.
//! Usage is gated behind a remote token service that verifies a token for
//! this device and deducts one credit per typing session.
//!
//! ## Features
//!
//! - One typing session at a time, tracked by a session handle
//! - Speed presets (`slow`, `normal`, `fast`, `instant`) or raw millisecond delays
//! - Jittered inter-character pauses
//! - Global trigger hotkey plus an Escape binding for cancellation
//! - Token verification, credit deduction and balance checks
//! - JSON configuration file support
//!
//! ## Example
//!
//! ```no_run
//! use typeassist::{events, keyboard, Dispatcher, Speed, Timing};
//!
//! # async fn demo() -> typeassist::Result<()> {
//! let (tx, mut rx) = events::channel();
//! let dispatcher = Dispatcher::new(keyboard::enigo_factory(), Timing::default(), tx);
//!
//! let session = dispatcher.start("hello", Speed::Fast)?;
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//!     if matches!(event, events::Event::TypingComplete { .. } | events::Event::TypingStopped { .. }) {
//!         break;
//!     }
//! }
//! session.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```json
//! {
//!   "hotkey": "F9",
//!   "speed": "fast",
//!   "settle_delay": "300ms",
//!   "request_timeout": "10s"
//! }
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod hotkey;
pub mod keyboard;
pub mod settings;
pub mod speed;

pub use app::{App, Payload};
pub use auth::VerificationClient;
pub use config::Config;
pub use dispatcher::{Dispatcher, ReadyKeyboard, SessionHandle, SessionId, SessionOutcome, Timing};
pub use error::{AuthError, AuthErrorKind, Result, TypeAssistError};
pub use events::Event;
pub use hotkey::{HotkeyAction, HotkeyManager};
pub use settings::{AuthRecord, FileStore, MemoryStore, SettingsStore};
pub use speed::Speed;
