//! Keystroke simulation.
//!
//! The dispatcher only talks to the [`Keystrokes`] trait. [`EnigoKeyboard`]
//! is the real backend; tests substitute a recording fake.

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::time::Duration;

use crate::error::{Result, TypeAssistError};

/// Something that can type one character into the focused window.
pub trait Keystrokes: Send {
    /// Fixed pause the backend applies after every character.
    fn set_auto_delay(&mut self, delay: Duration);

    fn auto_delay(&self) -> Duration;

    fn type_char(&mut self, ch: char) -> Result<()>;
}

/// Builds a fresh backend for each session; an error means the engine is unavailable.
pub type KeyboardFactory = Box<dyn Fn() -> Result<Box<dyn Keystrokes>> + Send + Sync>;

pub fn enigo_factory() -> KeyboardFactory {
    Box::new(|| Ok(Box::new(EnigoKeyboard::new()?) as Box<dyn Keystrokes>))
}

pub struct EnigoKeyboard {
    enigo: Enigo,
    auto_delay: Duration,
}

impl EnigoKeyboard {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| TypeAssistError::engine_unavailable(e.to_string()))?;
        Ok(Self {
            enigo,
            auto_delay: Duration::ZERO,
        })
    }
}

impl Keystrokes for EnigoKeyboard {
    fn set_auto_delay(&mut self, delay: Duration) {
        self.auto_delay = delay;
    }

    fn auto_delay(&self) -> Duration {
        self.auto_delay
    }

    fn type_char(&mut self, ch: char) -> Result<()> {
        let result = match ch {
            '\n' => self.enigo.key(Key::Return, Direction::Click),
            '\t' => self.enigo.key(Key::Tab, Direction::Click),
            // CRLF input would otherwise press Return twice
            '\r' => return Ok(()),
            other => {
                let mut buf = [0u8; 4];
                self.enigo.text(other.encode_utf8(&mut buf))
            }
        };
        result.map_err(|e| TypeAssistError::keystroke(ch, e.to_string()))
    }
}
