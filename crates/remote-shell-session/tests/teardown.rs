//! Teardown, detach and drop.

mod common;

use std::time::Duration;

use common::{Call, RecordingHost, ScriptedTransport, created, manager, settle, wait_for_state};
use remote_shell_core::{SessionState, ShellId};
use remote_shell_session::{InFlight, MemoryShellIdStore, ShellIdStore, SubmitError};
use remote_shell_transport::RestoreResponse;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_teardown_is_idempotent_and_kills_once() {
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1"));
    let host = RecordingHost::new();
    let session = manager(&transport, &host);
    let mut state = session.subscribe_state();

    assert_ok!(session.start(None));
    wait_for_state(&mut state, SessionState::Active).await;
    settle().await;
    assert!(session.in_flight().output_poll);

    session.teardown();
    session.teardown();
    settle().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.in_flight(), InFlight::default());
    assert_eq!(transport.kills(), 1);
    assert_eq!(transport.calls().last(), Some(&Call::Kill("s1".into())));
    assert_eq!(host.input_enabled(), Some(false));
    assert!(host.faults().is_empty());

    drop(session);
    settle().await;
    assert_eq!(transport.kills(), 1);
}

#[tokio::test]
async fn test_teardown_before_setup_completes() {
    let transport = ScriptedTransport::new();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);

    assert_ok!(session.start(None));
    settle().await;
    assert!(session.in_flight().setup);

    session.teardown();
    settle().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.in_flight(), InFlight::default());
    assert_eq!(transport.calls(), [Call::Create]);
}

#[tokio::test]
async fn test_teardown_without_start() {
    let transport = ScriptedTransport::new();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);

    session.teardown();
    settle().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert!(transport.calls().is_empty());
    assert_eq!(
        session.submit("ls"),
        Err(SubmitError::NotActive(SessionState::Closed))
    );
}

#[tokio::test]
async fn test_late_response_after_teardown_is_ignored() {
    let transport = ScriptedTransport::new();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);

    assert_ok!(session.start(None));
    session.teardown();
    // The create request is aborted before it runs, so queuing a response
    // now cannot revive the session.
    transport.push_create(created("s1"));
    settle().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.shell_id(), None);
    assert!(transport.polls().is_empty());
}

#[tokio::test]
async fn test_drop_tears_down() {
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1"));
    let host = RecordingHost::new();
    let session = manager(&transport, &host);
    let mut state = session.subscribe_state();

    assert_ok!(session.start(None));
    wait_for_state(&mut state, SessionState::Active).await;

    drop(session);
    wait_for_state(&mut state, SessionState::Closed).await;
    settle().await;

    assert_eq!(transport.kills(), 1);
    assert_eq!(transport.poll_concurrency.max(), 1);
}

#[tokio::test]
async fn test_detach_keeps_shell_for_restore() {
    let store = MemoryShellIdStore::new();
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1"));
    let host = RecordingHost::new();

    let first = manager(&transport, &host);
    let mut state = first.subscribe_state();
    assert_ok!(first.start(None));
    wait_for_state(&mut state, SessionState::Active).await;

    let shell_id = first.detach().expect("live shell id");
    assert_ok!(store.save("main", &shell_id).await);
    settle().await;
    assert_eq!(transport.kills(), 0);

    transport.push_restore(Ok(RestoreResponse {
        success: true,
        next_chunk_id: 3,
        output: Some("$ ".into()),
    }));
    let second = manager(&transport, &host);
    let mut state = second.subscribe_state();
    let prior = assert_ok!(store.load("main").await);
    assert_eq!(prior, Some(ShellId::new("s1")));
    assert_ok!(second.start(prior));
    wait_for_state(&mut state, SessionState::Active).await;

    assert_eq!(second.shell_id(), Some(ShellId::new("s1")));
    assert_eq!(second.next_chunk_id(), 3);
    assert_eq!(transport.count(|c| *c == Call::Create), 1);
}

#[tokio::test]
async fn test_detach_while_restoring_returns_prior_id() {
    let transport = ScriptedTransport::new();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);

    assert_ok!(session.start(Some(ShellId::new("s9"))));
    settle().await;

    assert_eq!(session.detach(), Some(ShellId::new("s9")));
    settle().await;
    assert_eq!(transport.kills(), 0);
}

#[tokio::test]
async fn test_teardown_while_restoring_kills_prior_shell() {
    let transport = ScriptedTransport::new();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);

    assert_ok!(session.start(Some(ShellId::new("s9"))));
    settle().await;
    assert_eq!(session.state(), SessionState::Restoring);

    session.teardown();
    settle().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(transport.kills(), 1);
    assert_eq!(transport.calls().last(), Some(&Call::Kill("s9".into())));
}

#[tokio::test]
async fn test_teardown_after_refused_restore_kills_prior_shell() {
    let transport = ScriptedTransport::new();
    transport.push_restore(Ok(RestoreResponse::default()));
    let host = RecordingHost::new();
    let session = manager(&transport, &host);
    let mut state = session.subscribe_state();

    assert_ok!(session.start(Some(ShellId::new("s9"))));
    wait_for_state(&mut state, SessionState::Registering).await;
    settle().await;
    assert!(session.in_flight().setup);

    session.teardown();
    settle().await;

    assert_eq!(transport.kills(), 1);
    assert_eq!(transport.calls().last(), Some(&Call::Kill("s9".into())));
}

#[tokio::test]
async fn test_shutdown_waits_for_kill() {
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1"));
    let host = RecordingHost::new();
    let session = manager(&transport, &host);
    let mut state = session.subscribe_state();

    assert_ok!(session.start(None));
    wait_for_state(&mut state, SessionState::Active).await;

    assert!(session.shutdown(Duration::from_secs(1)).await);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(transport.kills(), 1);

    // Nothing left to wait for the second time.
    assert!(session.shutdown(Duration::from_secs(1)).await);
    assert_eq!(transport.kills(), 1);
}

#[tokio::test]
async fn test_shutdown_gives_up_on_stuck_kill() {
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1")).hang_kills();
    let host = RecordingHost::new();
    let session = manager(&transport, &host);
    let mut state = session.subscribe_state();

    assert_ok!(session.start(None));
    wait_for_state(&mut state, SessionState::Active).await;

    assert!(!session.shutdown(Duration::from_millis(20)).await);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(transport.kills(), 1);
}

#[test]
fn test_kill_skipped_without_runtime() {
    let transport = ScriptedTransport::new();
    transport.push_create(created("s1"));
    let host = RecordingHost::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let session = runtime.block_on(async {
        let session = manager(&transport, &host);
        let mut state = session.subscribe_state();
        session.start(None).unwrap();
        wait_for_state(&mut state, SessionState::Active).await;
        session
    });
    drop(runtime);

    session.teardown();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(transport.kills(), 0);
}
