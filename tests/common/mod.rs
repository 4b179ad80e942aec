#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use typeassist::keyboard::{KeyboardFactory, Keystrokes};
use typeassist::{Result, TypeAssistError};

// =============================================================================
// Keyboard fakes
// =============================================================================

#[derive(Clone, Default)]
pub struct Recorder {
    pub typed: Arc<Mutex<Vec<char>>>,
    pub auto_delay: Arc<Mutex<Option<Duration>>>,
}

impl Recorder {
    pub fn typed(&self) -> String {
        self.typed.lock().unwrap().iter().collect()
    }

    pub fn auto_delay(&self) -> Option<Duration> {
        *self.auto_delay.lock().unwrap()
    }
}

struct RecordingKeyboard {
    recorder: Recorder,
    fail_on: Option<char>,
    delay: Duration,
}

impl Keystrokes for RecordingKeyboard {
    fn set_auto_delay(&mut self, delay: Duration) {
        self.delay = delay;
        *self.recorder.auto_delay.lock().unwrap() = Some(delay);
    }

    fn auto_delay(&self) -> Duration {
        self.delay
    }

    fn type_char(&mut self, ch: char) -> Result<()> {
        if Some(ch) == self.fail_on {
            return Err(TypeAssistError::keystroke(ch, "simulated failure"));
        }
        self.recorder.typed.lock().unwrap().push(ch);
        Ok(())
    }
}

pub fn recording_factory(recorder: &Recorder, fail_on: Option<char>) -> KeyboardFactory {
    let recorder = recorder.clone();
    Box::new(move || {
        Ok(Box::new(RecordingKeyboard {
            recorder: recorder.clone(),
            fail_on,
            delay: Duration::ZERO,
        }) as Box<dyn Keystrokes>)
    })
}

pub fn unavailable_factory() -> KeyboardFactory {
    Box::new(|| Err(TypeAssistError::engine_unavailable("no display")))
}

// =============================================================================
// Mock token service
// =============================================================================

#[derive(Debug, Clone)]
pub struct Account {
    pub email: String,
    pub credits: u64,
    pub total: u64,
    pub device: Option<String>,
}

#[derive(Clone, Default)]
pub struct TokenService {
    pub accounts: Arc<Mutex<HashMap<String, Account>>>,
}

impl TokenService {
    pub fn with_account(token: &str, email: &str, credits: u64) -> Self {
        let service = Self::default();
        service.accounts.lock().unwrap().insert(
            token.to_string(),
            Account {
                email: email.to_string(),
                credits,
                total: credits,
                device: None,
            },
        );
        service
    }

    pub fn bind(&self, token: &str, device: &str) {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(token) {
            account.device = Some(device.to_string());
        }
    }

    pub fn credits(&self, token: &str) -> u64 {
        self.accounts.lock().unwrap()[token].credits
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/token/verify", post(verify))
            .route("/api/token/use-credit", post(use_credit))
            .route("/api/token/balance/{token}", get(balance))
            .with_state(self.clone())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    token: String,
    device_id: String,
}

fn reply(status: StatusCode, body: Value) -> (StatusCode, Json<Value>) {
    (status, Json(body))
}

async fn verify(
    State(service): State<TokenService>,
    Json(req): Json<Credentials>,
) -> (StatusCode, Json<Value>) {
    let mut accounts = service.accounts.lock().unwrap();
    let Some(account) = accounts.get_mut(&req.token) else {
        return reply(StatusCode::NOT_FOUND, json!({ "error": "Token not found" }));
    };
    match &account.device {
        Some(device) if *device != req.device_id => reply(
            StatusCode::FORBIDDEN,
            json!({ "error": "Token is bound to a different device" }),
        ),
        _ => {
            account.device = Some(req.device_id);
            reply(
                StatusCode::OK,
                json!({
                    "valid": true,
                    "email": account.email,
                    "remainingCredits": account.credits,
                    "totalCredits": account.total,
                }),
            )
        }
    }
}

async fn use_credit(
    State(service): State<TokenService>,
    Json(req): Json<Credentials>,
) -> (StatusCode, Json<Value>) {
    let mut accounts = service.accounts.lock().unwrap();
    let Some(account) = accounts.get_mut(&req.token) else {
        return reply(StatusCode::NOT_FOUND, json!({ "error": "Token not found" }));
    };
    if account.device.as_deref() != Some(req.device_id.as_str()) {
        return reply(StatusCode::FORBIDDEN, json!({}));
    }
    if account.credits == 0 {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "No credits remaining. Please purchase more credits." }),
        );
    }
    account.credits -= 1;
    reply(
        StatusCode::OK,
        json!({
            "success": true,
            "remainingCredits": account.credits,
            "message": "Credit used",
        }),
    )
}

async fn balance(
    State(service): State<TokenService>,
    Path(token): Path<String>,
) -> (StatusCode, Json<Value>) {
    let accounts = service.accounts.lock().unwrap();
    match accounts.get(&token) {
        Some(account) => reply(
            StatusCode::OK,
            json!({
                "success": true,
                "remainingCredits": account.credits,
                "totalCredits": account.total,
            }),
        ),
        None => reply(StatusCode::NOT_FOUND, json!({ "error": "Token not found" })),
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL on which nothing is listening.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
