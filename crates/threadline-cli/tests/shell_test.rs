//! Scripted shell sessions against the simulated server.

use std::{sync::Arc, time::Duration};

use threadline_app::ClientState;
use threadline_cli::{Flow, Shell, ShellConfig, commands};

type TestShell = Shell<Vec<u8>>;

fn config() -> ShellConfig {
    ShellConfig {
        peers: vec![("bob".into(), "Bob".into()), ("carol".into(), "Carol".into())],
        ..ShellConfig::default()
    }
}

async fn line(shell: &mut TestShell, line: &str) -> Flow {
    let command = commands::parse(line).unwrap().unwrap();
    shell.execute(command).await.unwrap()
}

fn output(shell: &TestShell) -> String {
    String::from_utf8(shell.output().clone()).unwrap()
}

async fn wait_for(shell: &TestShell, predicate: impl FnMut(&Arc<ClientState>) -> bool) -> Arc<ClientState> {
    let mut rx = shell.handle().watch();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .unwrap()
        .unwrap();
    Arc::clone(&state)
}

/// Alice connected with "general" (alice and bob) joined.
async fn general() -> TestShell {
    let mut shell = Shell::new(config(), Vec::new()).unwrap();
    for command in ["/connect alice Alice", "/users", "/pick bob", "/create general"] {
        assert_eq!(line(&mut shell, command).await, Flow::Continue);
    }
    shell
}

#[tokio::test]
async fn create_say_and_peer_reply() {
    let mut shell = general().await;
    let state = shell.handle().snapshot();
    assert_eq!(state.channels.len(), 1);
    assert!(state.channels[0].has_member("bob"));
    assert!(state.active_channel.is_some());

    line(&mut shell, "hi").await;
    line(&mut shell, "/as bob hello alice").await;

    let state = wait_for(&shell, |s| s.messages.len() == 2).await;
    let texts: Vec<_> = state.messages.iter().filter_map(|m| m.text()).collect();
    assert_eq!(texts, ["hi", "hello alice"]);
    assert_eq!(state.messages[1].sender.nickname, "Bob");
}

#[tokio::test]
async fn thread_reply_and_edit() {
    let mut shell = general().await;
    line(&mut shell, "question").await;
    let parent = shell.handle().snapshot().messages[0].id;

    line(&mut shell, &format!("/thread {parent}")).await;
    line(&mut shell, "/reply answer").await;
    let state = shell.handle().snapshot();
    let thread = state.thread.as_ref().unwrap();
    assert_eq!(thread.parent.id, parent);
    assert_eq!(thread.replies.len(), 1);
    assert_eq!(state.messages.len(), 1);

    line(&mut shell, &format!("/edit {parent} better question")).await;
    let state = shell.handle().snapshot();
    assert_eq!(state.messages[0].text(), Some("better question"));
    assert!(state.messages[0].edited);
    assert_eq!(state.inputs.editing, None);

    line(&mut shell, "/close").await;
    assert!(shell.handle().snapshot().thread.is_none());
}

#[tokio::test]
async fn file_upload_and_delete() {
    let mut shell = general().await;
    line(&mut shell, "/file notes.txt remember the milk").await;

    let state = shell.handle().snapshot();
    let file = &state.messages[0];
    assert!(file.text().is_none());
    let url = state.active_channel.clone().unwrap();
    assert_eq!(shell.server().messages(&url).len(), 1);

    line(&mut shell, &format!("/rm {}", file.id)).await;
    wait_for(&shell, |s| s.messages.is_empty()).await;
    assert!(shell.server().messages(&url).is_empty());
}

#[tokio::test]
async fn silent_peer_keeps_up_with_channel() {
    let mut shell = general().await;
    line(&mut shell, "/as bob hello").await;
    line(&mut shell, "hi").await;
    line(&mut shell, "hi again").await;

    let bob = shell.peer("bob").unwrap();
    let texts: Vec<_> = bob.state().messages.iter().filter_map(|m| m.text()).collect();
    assert_eq!(texts, ["hello", "hi", "hi again"]);
    assert!(shell.peer("carol").is_none());
}

#[tokio::test]
async fn failures_are_reported_without_stopping() {
    let mut shell = general().await;

    assert_eq!(line(&mut shell, "/rm 999").await, Flow::Continue);
    assert!(shell.handle().snapshot().last_error.is_some());
    line(&mut shell, "/dismiss").await;
    assert!(shell.handle().snapshot().last_error.is_none());

    line(&mut shell, "/join 5").await;
    line(&mut shell, "/as zed hi").await;
    let out = output(&shell);
    assert!(out.contains("error: no channel 5"));
    assert!(out.contains("error: unknown peer: zed"));
}

#[tokio::test]
async fn peer_outside_channel_cannot_post() {
    let mut shell = general().await;
    line(&mut shell, "/as carol hi").await;
    assert!(output(&shell).contains("error: peer carol:"));

    line(&mut shell, "/pick carol").await;
    line(&mut shell, "/invite").await;
    let state = wait_for(&shell, |s| {
        s.active_channel().is_some_and(|c| c.has_member("carol"))
    })
    .await;
    assert!(state.last_error.is_none());

    line(&mut shell, "/as carol hi").await;
    wait_for(&shell, |s| s.messages.iter().any(|m| m.sender.user_id == "carol")).await;
}

#[tokio::test]
async fn run_renders_script_until_quit() {
    let mut shell = Shell::new(config(), Vec::new()).unwrap();
    let script = "/connect alice Alice\n/bogus\n/help\n/quit\n/connect never\n";

    shell.run(script.as_bytes()).await.unwrap();

    let out = output(&shell);
    assert!(out.starts_with("status: disconnected\n"));
    assert!(out.contains("unknown command: /bogus (try /help)"));
    assert!(out.contains("/thread ID"));
    assert!(out.contains("status: connected as Alice (alice)"));
    assert_eq!(shell.handle().snapshot().current_user_id(), Some("alice"));

    shell.shutdown().await;
}
