//! Text rendering of client snapshots.
//!
//! The whole view is redrawn from the snapshot on every change.

use std::io::{self, Write};

use threadline_app::{
    ClientState, ConnectionState, Message, MessageBody, channel_display_name, format_timestamp,
    profile_initial,
};

use crate::commands::HELP;

/// Write the full view of `state`.
pub fn render(state: &ClientState, out: &mut impl Write) -> io::Result<()> {
    render_status(state, out)?;

    if !state.channels.is_empty() {
        writeln!(out, "channels:")?;
        for (i, channel) in state.channels.iter().enumerate() {
            let marker = if state.is_active(&channel.url) { '*' } else { ' ' };
            write!(out, "{marker} {}. {}", i + 1, channel_display_name(channel))?;
            match &channel.last_message {
                Some(last) => writeln!(out, " (last: {})", content(last))?,
                None => writeln!(out)?,
            }
        }
    }

    let me = state.current_user_id().unwrap_or_default();
    if let Some(channel) = state.active_channel() {
        writeln!(out, "messages in {}:", channel_display_name(channel))?;
        if state.messages.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for message in &state.messages {
            render_message(message, me, out)?;
        }
    }

    if let Some(thread) = &state.thread {
        let parent = &thread.parent;
        writeln!(out, "thread on [{}] {}: {}", parent.id, sender(parent, me), content(parent))?;
        if thread.replies.is_empty() {
            writeln!(out, "  (no replies)")?;
        }
        for reply in &thread.replies {
            render_message(reply, me, out)?;
        }
    }

    if let Some(id) = state.inputs.editing {
        writeln!(out, "editing [{id}]")?;
    }

    if !state.application_users.is_empty() {
        writeln!(out, "users:")?;
        for user in &state.application_users {
            let picked = if state.inputs.selected_members.contains(&user.user_id) { 'x' } else { ' ' };
            writeln!(out, "  [{picked}] {} ({})", user.user_id, user.nickname)?;
        }
    }

    if let Some(error) = &state.last_error {
        writeln!(out, "error: {error}")?;
    }
    Ok(())
}

/// Write the command reference.
pub fn render_help(out: &mut impl Write) -> io::Result<()> {
    let width = HELP.iter().map(|(usage, _)| usage.len()).max().unwrap_or(0);
    for (usage, description) in HELP {
        writeln!(out, "  {usage:<width$}  {description}")?;
    }
    writeln!(out, "  anything else is sent to the active channel")
}

fn render_status(state: &ClientState, out: &mut impl Write) -> io::Result<()> {
    match (&state.connection, &state.session) {
        (ConnectionState::Connected, Some(session)) => writeln!(
            out,
            "status: connected as {} ({})",
            session.display_name(),
            session.current_user_id()
        ),
        (ConnectionState::Connecting, _) => writeln!(out, "status: connecting"),
        _ => writeln!(out, "status: disconnected"),
    }
}

fn render_message(message: &Message, me: &str, out: &mut impl Write) -> io::Result<()> {
    let edited = if message.edited { " (edited)" } else { "" };
    writeln!(
        out,
        "  [{}] {} ({}) {}: {}{edited}",
        message.id,
        format_timestamp(message.created_at),
        profile_initial(&message.sender),
        sender(message, me),
        content(message)
    )
}

fn sender<'a>(message: &'a Message, me: &str) -> &'a str {
    if message.sent_by(me) { "you" } else { &message.sender.nickname }
}

fn content(message: &Message) -> String {
    match &message.body {
        MessageBody::Text { text } => text.clone(),
        MessageBody::File { name, size, .. } => format!("<file {name}, {size} bytes>"),
    }
}

#[cfg(test)]
mod tests {
    use threadline_app::{Channel, Session, ThreadView, User};

    use super::*;

    fn user(id: &str) -> User {
        let mut nickname = id.to_owned();
        nickname[..1].make_ascii_uppercase();
        User::new(id, nickname)
    }

    fn message(id: u64, from: &str, text: &str, minute: i64) -> Message {
        Message {
            id,
            channel_url: "c1".into(),
            parent_id: None,
            sender: user(from),
            body: MessageBody::text(text),
            created_at: minute * 60_000,
            edited: false,
        }
    }

    fn connected() -> ClientState {
        ClientState {
            connection: ConnectionState::Connected,
            session: Some(Session { user: user("alice") }),
            ..ClientState::default()
        }
    }

    fn channel(url: &str, members: &[&str], last: Option<Message>) -> Channel {
        Channel {
            url: url.into(),
            name: "general".into(),
            members: members.iter().map(|m| user(m)).collect(),
            operator_ids: vec!["alice".into()],
            last_message: last,
            created_at: 0,
        }
    }

    fn text(state: &ClientState) -> String {
        let mut out = Vec::new();
        render(state, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn disconnected_view_is_one_line() {
        insta::assert_snapshot!(text(&ClientState::default()), @"status: disconnected");
    }

    #[test]
    fn active_channel_with_messages() {
        let hi = message(1, "alice", "hi", 0);
        let mut hello = message(2, "bob", "hello", 1);
        hello.edited = true;

        let mut state = connected();
        state.channels = vec![
            channel("c1", &["alice", "bob"], Some(hello.clone())),
            channel("c2", &["alice", "bob", "carol", "dave"], None),
        ];
        state.active_channel = Some("c1".into());
        state.messages = vec![hi, hello];
        state.inputs.editing = Some(1);

        insta::assert_snapshot!(text(&state), @r"
        status: connected as Alice (alice)
        channels:
        * 1. Alice, Bob (last: hello)
          2. Alice, Bob + 2
        messages in Alice, Bob:
          [1] 00:00 (A) you: hi
          [2] 00:01 (B) Bob: hello (edited)
        editing [1]
        ");
    }

    #[test]
    fn open_thread_and_file_reply() {
        let parent = message(1, "bob", "question", 5);
        let mut reply = message(2, "alice", "", 6);
        reply.parent_id = Some(1);
        reply.body = MessageBody::File {
            url: "sim://files/2".into(),
            name: "answer.txt".into(),
            mime_type: "text/plain".into(),
            size: 42,
        };

        let mut state = connected();
        state.channels = vec![channel("c1", &["alice", "bob"], Some(parent.clone()))];
        state.active_channel = Some("c1".into());
        state.messages = vec![parent.clone()];
        state.thread = Some(ThreadView::new(parent, vec![reply]));
        state.last_error = Some("failed to send message: rejected: empty".into());

        insta::assert_snapshot!(text(&state), @r"
        status: connected as Alice (alice)
        channels:
        * 1. Alice, Bob (last: question)
        messages in Alice, Bob:
          [1] 00:05 (B) Bob: question
        thread on [1] Bob: question
          [2] 00:06 (A) you: <file answer.txt, 42 bytes>
        error: failed to send message: rejected: empty
        ");
    }

    #[test]
    fn member_picker_marks_selection() {
        let mut state = connected();
        state.application_users = vec![user("alice"), user("bob"), user("carol")];
        state.inputs.selected_members = vec!["alice".into(), "carol".into()];

        insta::assert_snapshot!(text(&state), @r"
        status: connected as Alice (alice)
        users:
          [x] alice (Alice)
          [ ] bob (Bob)
          [x] carol (Carol)
        ");
    }

    #[test]
    fn help_lists_every_command() {
        let mut out = Vec::new();
        render_help(&mut out).unwrap();
        let help = String::from_utf8(out).unwrap();
        assert_eq!(help.lines().count(), HELP.len() + 1);
        assert!(help.contains("/thread ID"));
    }
}
