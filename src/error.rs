//! Error types for typeassist.
//!
//! `TypeAssistError` covers everything the library can fail at. Failures
//! reported by the remote token service are kept in their own closed
//! taxonomy, [`AuthError`], because they are surfaced to the user verbatim.

use serde::Serialize;
use std::io;
use thiserror::Error;

use crate::dispatcher::SessionId;

pub const NETWORK_ERROR: &str = "Network error. Please check your connection.";
pub const INVALID_TOKEN: &str = "Invalid token. Please try again.";
pub const DEVICE_MISMATCH: &str = "This token is already bound to another device.";
pub const SERVER_ERROR: &str = "Server error. Please try again later.";
pub const GENERIC_REJECTION: &str = "An error occurred";

/// Main error type for typeassist operations.
#[derive(Error, Debug)]
pub enum TypeAssistError {
    /// A typing session is already running.
    #[error("already typing (session {session})")]
    AlreadyTyping { session: SessionId },

    /// The keystroke backend could not be initialised.
    #[error("typing engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A single character could not be emitted.
    #[error("failed to type {ch:?}: {reason}")]
    Keystroke { ch: char, reason: String },

    /// The hotkey string could not be parsed.
    #[error("invalid hotkey '{key}': {reason}")]
    InvalidHotkey { key: String, reason: String },

    /// The OS refused the global binding, usually because another process owns it.
    #[error("failed to register hotkey '{key}': {reason}")]
    HotkeyRegistration { key: String, reason: String },

    #[error("hotkey error: {0}")]
    Hotkey(String),

    #[error("invalid speed '{value}': {reason}")]
    InvalidSpeed { value: String, reason: String },

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("configuration error: {0}")]
    ConfigValidation(String),

    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Reading or writing the persisted auth record failed.
    #[error("settings error: {0}")]
    Settings(String),

    /// No verified token is stored.
    #[error("not authenticated; run `typeassist login <TOKEN>` first")]
    NotAuthenticated,

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Session bookkeeping failed (poisoned lock, panicked task).
    #[error("session error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for typeassist operations.
pub type Result<T> = std::result::Result<T, TypeAssistError>;

impl TypeAssistError {
    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::EngineUnavailable(message.into())
    }

    pub fn keystroke(ch: char, reason: impl Into<String>) -> Self {
        Self::Keystroke {
            ch,
            reason: reason.into(),
        }
    }

    pub fn invalid_hotkey(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHotkey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn hotkey_registration(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HotkeyRegistration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    pub fn invalid_speed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpeed {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }
}

/// Identifier of an [`AuthError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthErrorKind {
    InvalidToken,
    DeviceMismatch,
    ServerError,
    NetworkError,
    Rejected,
}

impl AuthErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid-token",
            Self::DeviceMismatch => "device-mismatch",
            Self::ServerError => "server-error",
            Self::NetworkError => "network-error",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the token service, or the lack of any response from it.
///
/// `Display` is the message shown to the user; the server's own wording wins
/// when it supplied one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    DeviceMismatch(String),

    #[error("{}", SERVER_ERROR)]
    Server { status: u16 },

    /// No response: timeout, refused connection, or a request that could not be built.
    #[error("{}", NETWORK_ERROR)]
    Network { detail: String },

    /// Any other refusal (unexpected 4xx, or `success: false` on a 2xx).
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidToken(_) => AuthErrorKind::InvalidToken,
            Self::DeviceMismatch(_) => AuthErrorKind::DeviceMismatch,
            Self::Server { .. } => AuthErrorKind::ServerError,
            Self::Network { .. } => AuthErrorKind::NetworkError,
            Self::Rejected { .. } => AuthErrorKind::Rejected,
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    /// Maps a non-2xx status and the optional server `error` field.
    pub fn from_status(status: u16, server_message: Option<String>) -> Self {
        match status {
            404 => Self::InvalidToken(INVALID_TOKEN.to_string()),
            400 => Self::InvalidToken(server_message.unwrap_or_else(|| INVALID_TOKEN.to_string())),
            403 => Self::DeviceMismatch(
                server_message.unwrap_or_else(|| DEVICE_MISMATCH.to_string()),
            ),
            s if s >= 500 => Self::Server { status: s },
            s => Self::Rejected {
                status: s,
                message: server_message.unwrap_or_else(|| GENERIC_REJECTION.to_string()),
            },
        }
    }
}
