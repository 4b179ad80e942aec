//! Application flows tying the dispatcher, token service and settings together.

use serde_json::json;
use tokio::sync::mpsc;

use crate::auth::{Balance, CreditUse, Verification, VerificationClient};
use crate::dispatcher::{Dispatcher, SessionHandle, SessionId};
use crate::error::{Result, TypeAssistError};
use crate::events::{emit, Event, EventSender};
use crate::hotkey::HotkeyAction;
use crate::settings::{
    AuthRecord, SettingsStore, KEY_AUTHENTICATED, KEY_CREDITS, KEY_DEVICE_ID, KEY_EMAIL, KEY_TOKEN,
};
use crate::speed::Speed;

/// Text typed whenever the trigger hotkey fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub text: String,
    pub speed: Speed,
}

pub struct App<S> {
    store: S,
    client: VerificationClient,
    dispatcher: Dispatcher,
    device_id: String,
    events: EventSender,
}

impl<S: SettingsStore> App<S> {
    pub fn new(
        store: S,
        client: VerificationClient,
        dispatcher: Dispatcher,
        device_id: impl Into<String>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            client,
            dispatcher,
            device_id: device_id.into(),
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn auth_state(&self) -> AuthRecord {
        self.store.auth_record()
    }

    /// Verifies `token` for this device and stores the resulting record.
    pub async fn verify_token(&mut self, token: &str) -> Result<Verification> {
        let verification = self.client.verify(token, &self.device_id).await?;

        self.store.set(KEY_TOKEN, json!(token))?;
        self.store.set(KEY_EMAIL, json!(verification.email))?;
        self.store.set(KEY_CREDITS, json!(verification.remaining_credits))?;
        self.store.set(KEY_DEVICE_ID, json!(self.device_id))?;
        self.store.set(KEY_AUTHENTICATED, json!(true))?;

        tracing::info!(
            email = %verification.email,
            credits = verification.remaining_credits,
            "Token verified"
        );
        Ok(verification)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Deducts one credit for the stored token and records the remaining count.
    pub async fn use_credit(&mut self) -> Result<CreditUse> {
        let record = self.authenticated_record()?;
        let device_id = if record.device_id.is_empty() {
            self.device_id.clone()
        } else {
            record.device_id
        };

        let used = self.client.use_credit(&record.token, &device_id).await?;
        self.store.set(KEY_CREDITS, json!(used.remaining_credits))?;
        tracing::info!(remaining = used.remaining_credits, "Credit used");
        Ok(used)
    }

    /// Refreshes the stored credit count from the server.
    pub async fn balance(&mut self) -> Result<Balance> {
        let record = self.authenticated_record()?;
        let balance = self.client.balance(&record.token).await?;
        self.store.set(KEY_CREDITS, json!(balance.remaining_credits))?;
        Ok(balance)
    }

    /// Consumes a credit and starts a typing session.
    ///
    /// No credit is spent when a session is already running or the
    /// keystroke engine cannot be created.
    pub async fn type_text(&mut self, payload: &Payload) -> Result<SessionHandle> {
        self.authenticated_record()?;
        let keyboard = self.dispatcher.prepare()?;
        self.use_credit().await?;
        self.dispatcher.start_with(keyboard, &payload.text, payload.speed)
    }

    pub fn stop_typing(&self) -> Result<Option<SessionId>> {
        self.dispatcher.stop()
    }

    /// Reacts to one hotkey press.
    pub async fn handle_action(&mut self, action: HotkeyAction, payload: &Payload) -> Option<SessionHandle> {
        match action {
            HotkeyAction::Trigger => {
                if self.dispatcher.is_typing() {
                    tracing::debug!("Trigger ignored while typing");
                    return None;
                }
                emit(&self.events, Event::HotkeyTriggered);
                match self.type_text(payload).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not start typing");
                        // engine failures are already reported by the dispatcher
                        if !matches!(e, TypeAssistError::EngineUnavailable(_)) {
                            emit(
                                &self.events,
                                Event::TypingError {
                                    message: e.to_string(),
                                },
                            );
                        }
                        None
                    }
                }
            }
            HotkeyAction::Cancel => {
                if let Err(e) = self.dispatcher.stop() {
                    tracing::error!(error = %e, "Failed to stop typing");
                }
                None
            }
        }
    }

    /// Handles hotkey actions until the channel closes or Ctrl-C is pressed.
    pub async fn run(
        &mut self,
        payload: &Payload,
        mut actions: mpsc::UnboundedReceiver<HotkeyAction>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => {
                        self.handle_action(action, payload).await;
                    }
                    None => break,
                },
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        if let Some(session) = self.stop_typing()? {
            tracing::info!(session = %session, "Stopping active session on shutdown");
        }
        Ok(())
    }

    fn authenticated_record(&self) -> Result<AuthRecord> {
        let record = self.store.auth_record();
        if !record.authenticated || record.token.is_empty() {
            return Err(TypeAssistError::NotAuthenticated);
        }
        Ok(record)
    }
}
