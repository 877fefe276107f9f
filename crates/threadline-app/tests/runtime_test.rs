//! Runtime actor tests.
//!
//! Drive controllers through [`RuntimeHandle`]s and observe them the way a
//! renderer does: through the published snapshot stream.

use std::{sync::Arc, time::Duration};

use threadline_app::{
    ChatError, ClientState, ConnectionState, Controller, ControllerConfig, InputTarget, Runtime,
    RuntimeConfig, RuntimeHandle,
};
use threadline_harness::{ClientSnapshot, InvariantRegistry, SimServer, SystemSnapshot};
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

fn spawn(server: &SimServer) -> RuntimeHandle {
    let controller = Controller::new(server.client(), ControllerConfig::default()).unwrap();
    Runtime::spawn(controller, &RuntimeConfig::default())
}

/// Wait until a published snapshot satisfies `predicate`.
async fn wait_for(
    rx: &mut watch::Receiver<Arc<ClientState>>,
    predicate: impl FnMut(&Arc<ClientState>) -> bool,
) -> Arc<ClientState> {
    let state = tokio::time::timeout(WAIT, rx.wait_for(predicate)).await.unwrap().unwrap();
    Arc::clone(&state)
}

#[tokio::test]
async fn commands_are_answered_and_snapshots_published() {
    let server = SimServer::new(3);
    server.register_user("bob", "Bob");
    let alice = spawn(&server);
    let mut rx = alice.watch();

    let session = alice.connect("alice", "Alice").await.unwrap();
    assert_eq!(session.user.user_id, "alice");
    assert_eq!(alice.snapshot().connection, ConnectionState::Connected);

    let channel = alice.create_channel("general", vec!["bob".into()]).await.unwrap();
    alice.join_channel(channel.url.clone()).await.unwrap();
    alice.send_message(channel.url.clone(), "hi", None).await.unwrap();

    let state = wait_for(&mut rx, |s| s.messages.len() == 1).await;
    assert_eq!(state.messages[0].text(), Some("hi"));
    assert!(state.is_active(&channel.url));

    alice.shutdown().await.unwrap();
}

#[tokio::test]
async fn pushes_are_applied_by_the_actor() {
    let server = SimServer::new(3);
    server.register_user("bob", "Bob");

    let alice = spawn(&server);
    alice.connect("alice", "Alice").await.unwrap();
    let url = alice.create_channel("general", vec!["bob".into()]).await.unwrap().url;
    alice.join_channel(url.clone()).await.unwrap();

    let bob = spawn(&server);
    bob.connect("bob", "Bob").await.unwrap();
    bob.join_channel(url.clone()).await.unwrap();
    let mut bob_rx = bob.watch();

    let sent = alice.send_message(url.clone(), "hello bob", None).await.unwrap();
    let state = wait_for(&mut bob_rx, |s| s.messages.iter().any(|m| m.id == sent.id)).await;
    assert_eq!(state.active_channel().and_then(|c| c.last_message.as_ref()), Some(&sent));

    alice.edit_message(sent.id, "hello Bob").await.unwrap();
    wait_for(&mut bob_rx, |s| s.messages.iter().any(|m| m.id == sent.id && m.edited)).await;

    alice.delete_message(sent.id).await.unwrap();
    let state = wait_for(&mut bob_rx, |s| s.messages.is_empty()).await;

    let snapshot = SystemSnapshot::from_clients(vec![
        ClientSnapshot::new("alice", alice.snapshot()),
        ClientSnapshot::new("bob", state),
    ]);
    InvariantRegistry::standard().assert_all(&snapshot, "after push sequence");

    alice.shutdown().await.unwrap();
    bob.shutdown().await.unwrap();
}

#[tokio::test]
async fn input_buffers_drive_send_and_edit() {
    let server = SimServer::new(5);
    server.register_user("bob", "Bob");
    let alice = spawn(&server);
    alice.connect("alice", "Alice").await.unwrap();
    let url = alice.create_channel("general", vec!["bob".into()]).await.unwrap().url;
    alice.join_channel(url).await.unwrap();

    alice.set_input(InputTarget::Message, "draft").await.unwrap();
    assert_eq!(alice.snapshot().inputs.message, "draft");
    let sent = alice.submit_message_input().await.unwrap();
    assert!(alice.snapshot().inputs.message.is_empty());

    alice.begin_edit(sent.id).await.unwrap();
    assert_eq!(alice.snapshot().inputs.editing, Some(sent.id));
    alice.set_input(InputTarget::Message, "final").await.unwrap();
    let edited = alice.submit_message_input().await.unwrap();
    assert_eq!(edited.id, sent.id);
    assert_eq!(alice.snapshot().messages[0].text(), Some("final"));
    assert_eq!(alice.snapshot().inputs.editing, None);

    alice.open_thread(sent.id).await.unwrap();
    alice.set_input(InputTarget::Thread, "in thread").await.unwrap();
    let reply = alice.submit_thread_input().await.unwrap();
    assert_eq!(reply.parent_id, Some(sent.id));
    alice.close_thread().await.unwrap();
    assert!(alice.snapshot().thread.is_none());

    alice.shutdown().await.unwrap();
}

#[tokio::test]
async fn errors_are_returned_and_recorded() {
    let server = SimServer::new(9);
    let alice = spawn(&server);

    let err = alice.join_channel("nowhere").await.unwrap_err();
    assert!(matches!(err, ChatError::InvalidState { .. }));
    assert!(alice.snapshot().last_error.is_some());

    alice.dismiss_error().await.unwrap();
    assert!(alice.snapshot().last_error.is_none());

    alice.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_every_handle() {
    let server = SimServer::new(11);
    let alice = spawn(&server);
    let other = alice.clone();
    alice.connect("alice", "Alice").await.unwrap();
    assert_eq!(server.subscriber_count(), 1);

    alice.shutdown().await.unwrap();

    assert_eq!(other.leave_channel().await, Err(ChatError::RuntimeClosed));
    assert!(!other.is_running());
    assert_eq!(server.subscriber_count(), 0);
    assert_eq!(other.snapshot().connection, ConnectionState::Disconnected);
}

#[tokio::test]
async fn dropping_all_handles_stops_the_actor() {
    let server = SimServer::new(13);
    let controller = Controller::new(server.client(), ControllerConfig::default()).unwrap();
    let (runtime, handle) = Runtime::new(controller, &RuntimeConfig { mailbox_capacity: 0 });
    let task = tokio::spawn(runtime.run());

    handle.connect("alice", "Alice").await.unwrap();
    assert_eq!(server.subscriber_count(), 1);

    drop(handle);
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(server.subscriber_count(), 0);
}
