mod common;

use std::time::Duration;

use common::{recording_factory, serve, unavailable_factory, Recorder, TokenService};
use typeassist::keyboard::KeyboardFactory;
use typeassist::events::{self, Event, EventReceiver};
use typeassist::settings::{AuthRecord, SettingsStore};
use typeassist::{
    App, AuthErrorKind, Dispatcher, HotkeyAction, MemoryStore, Payload, SessionOutcome, Speed,
    Timing, TypeAssistError, VerificationClient,
};

const TOKEN: &str = "tok-abc";
const DEVICE: &str = "this-device";

fn quick_timing() -> Timing {
    Timing {
        settle_delay: Duration::ZERO,
        jitter_factor: 0.0,
    }
}

async fn app_with(service: &TokenService, recorder: &Recorder) -> (App<MemoryStore>, EventReceiver) {
    app_with_keyboard(service, recording_factory(recorder, None)).await
}

async fn app_with_keyboard(
    service: &TokenService,
    keyboard: KeyboardFactory,
) -> (App<MemoryStore>, EventReceiver) {
    let url = serve(service.router()).await;
    let (tx, rx) = events::channel();
    let dispatcher = Dispatcher::new(keyboard, quick_timing(), tx.clone());
    let client = VerificationClient::new(url, Duration::from_secs(5)).unwrap();
    (App::new(MemoryStore::new(), client, dispatcher, DEVICE, tx), rx)
}

fn payload(text: &str) -> Payload {
    Payload {
        text: text.to_string(),
        speed: Speed::Millis(0),
    }
}

fn drain(rx: &mut EventReceiver) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_login_persists_record() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let (mut app, _rx) = app_with(&service, &Recorder::default()).await;

    app.verify_token(TOKEN).await.unwrap();

    let record = app.auth_state();
    assert!(record.authenticated);
    assert_eq!(record.token, TOKEN);
    assert_eq!(record.email, "user@example.com");
    assert_eq!(record.credits, 5);
    assert_eq!(record.device_id, DEVICE);
}

#[tokio::test]
async fn test_failed_login_stores_nothing() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    service.bind(TOKEN, "someone-else");
    let (mut app, _rx) = app_with(&service, &Recorder::default()).await;

    let err = app.verify_token(TOKEN).await.unwrap_err();
    assert!(matches!(err, TypeAssistError::Auth(ref e) if e.kind() == AuthErrorKind::DeviceMismatch));
    assert!(!app.store().has_token());
    assert!(!app.auth_state().authenticated);
}

#[tokio::test]
async fn test_logout_clears_record() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let (mut app, _rx) = app_with(&service, &Recorder::default()).await;

    app.verify_token(TOKEN).await.unwrap();
    app.logout().unwrap();

    assert_eq!(app.auth_state(), AuthRecord::default());
    assert!(matches!(
        app.use_credit().await,
        Err(TypeAssistError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn test_typing_requires_login() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let recorder = Recorder::default();
    let (mut app, _rx) = app_with(&service, &recorder).await;

    let err = app.type_text(&payload("hi")).await.unwrap_err();
    assert!(matches!(err, TypeAssistError::NotAuthenticated));
    assert_eq!(service.credits(TOKEN), 5);
    assert_eq!(recorder.typed(), "");
}

#[tokio::test]
async fn test_typing_spends_one_credit() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let recorder = Recorder::default();
    let (mut app, _rx) = app_with(&service, &recorder).await;
    app.verify_token(TOKEN).await.unwrap();

    let session = app.type_text(&payload("hello")).await.unwrap();
    assert_eq!(
        session.wait().await.unwrap(),
        SessionOutcome::Completed { typed: 5 }
    );

    assert_eq!(recorder.typed(), "hello");
    assert_eq!(service.credits(TOKEN), 4);
    assert_eq!(app.auth_state().credits, 4);
}

#[tokio::test]
async fn test_no_credits_blocks_typing() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 0);
    let recorder = Recorder::default();
    let (mut app, _rx) = app_with(&service, &recorder).await;
    app.verify_token(TOKEN).await.unwrap();

    let err = app.type_text(&payload("hello")).await.unwrap_err();
    assert!(err.to_string().contains("No credits remaining"));
    assert!(!app.dispatcher().is_typing());
    assert_eq!(recorder.typed(), "");
}

#[tokio::test]
async fn test_missing_engine_spends_no_credit() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let (mut app, mut rx) = app_with_keyboard(&service, unavailable_factory()).await;
    app.verify_token(TOKEN).await.unwrap();

    let err = app.type_text(&payload("hi")).await.unwrap_err();
    assert!(matches!(err, TypeAssistError::EngineUnavailable(_)));
    assert_eq!(service.credits(TOKEN), 5);
    assert_eq!(app.auth_state().credits, 5);
    assert!(!app.dispatcher().is_typing());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [Event::TypingError { message }] if message.contains("no display")
    ));
}

#[tokio::test]
async fn test_balance_refreshes_cached_credits() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let (mut app, _rx) = app_with(&service, &Recorder::default()).await;
    app.verify_token(TOKEN).await.unwrap();

    service.accounts.lock().unwrap().get_mut(TOKEN).unwrap().credits = 42;
    let balance = app.balance().await.unwrap();
    assert_eq!(balance.remaining_credits, 42);
    assert_eq!(app.auth_state().credits, 42);
}

#[tokio::test]
async fn test_trigger_and_cancel_actions() {
    let service = TokenService::with_account(TOKEN, "user@example.com", 5);
    let recorder = Recorder::default();
    let (mut app, mut rx) = app_with(&service, &recorder).await;
    app.verify_token(TOKEN).await.unwrap();

    let long = Payload {
        text: "a fairly long payload".to_string(),
        speed: Speed::Millis(20),
    };
    let session = app
        .handle_action(HotkeyAction::Trigger, &long)
        .await
        .expect("session started");

    // a second trigger while typing is ignored and costs nothing
    assert!(app.handle_action(HotkeyAction::Trigger, &long).await.is_none());
    assert_eq!(service.credits(TOKEN), 4);

    assert!(app.handle_action(HotkeyAction::Cancel, &long).await.is_none());
    let outcome = session.wait().await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Stopped { .. }));

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&Event::HotkeyTriggered));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TypingCancelled { .. })));
    assert!(matches!(events.last(), Some(Event::TypingStopped { .. })));
    assert!(recorder.typed().len() < long.text.len());
}

#[tokio::test]
async fn test_cancel_while_idle_does_nothing() {
    let service = TokenService::default();
    let (mut app, mut rx) = app_with(&service, &Recorder::default()).await;

    assert!(app
        .handle_action(HotkeyAction::Cancel, &payload("x"))
        .await
        .is_none());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_trigger_without_login_reports_error() {
    let service = TokenService::default();
    let (mut app, mut rx) = app_with(&service, &Recorder::default()).await;

    assert!(app
        .handle_action(HotkeyAction::Trigger, &payload("x"))
        .await
        .is_none());
    let events = drain(&mut rx);
    assert_eq!(events[0], Event::HotkeyTriggered);
    assert!(matches!(&events[1], Event::TypingError { message } if message.contains("not authenticated")));
}
