//! Application state machine.
//!
//! This module defines the [`App`] state machine, which owns the client state
//! snapshot completely decoupled from the backend and from rendering.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! reports whether the visible state changed. Every change clones the current
//! snapshot on write, so readers holding an older `Arc<ClientState>` are never
//! affected.
//!
//! # Responsibilities
//!
//! - Tracks the session, the cached channel list and the active channel.
//! - Places sent and received messages into the top-level list or the open
//!   thread, reconciling duplicates by message ID.
//! - Tracks input buffers, editing mode and the member selector.

use std::sync::Arc;

use crate::{
    AppEvent, Channel, ClientState, ConnectionState, InputTarget, Message, MessageId,
    state::{remove, replace, sort_chronologically, upsert},
};

/// Application state machine.
///
/// Pure state machine that processes events and produces snapshots.
/// No I/O dependencies - fully testable without a backend.
#[derive(Debug, Clone, Default)]
pub struct App {
    state: Arc<ClientState>,
}

impl App {
    /// Create an App in the disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<ClientState> {
        Arc::clone(&self.state)
    }

    /// Process an event. Returns `true` if the visible state changed.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        let state = Arc::make_mut(&mut self.state);
        match event {
            AppEvent::Connecting => {
                state.connection = ConnectionState::Connecting;
                state.last_error = None;
                true
            },
            AppEvent::Connected { session, channels } => {
                *state = ClientState {
                    connection: ConnectionState::Connected,
                    session: Some(session),
                    channels,
                    ..ClientState::default()
                };
                true
            },
            AppEvent::ConnectFailed { message } => {
                *state = ClientState { last_error: Some(message), ..ClientState::default() };
                true
            },
            AppEvent::Disconnected => {
                *state = ClientState::default();
                true
            },
            AppEvent::UsersLoaded(users) => {
                state.application_users = users;
                state.inputs.selected_members = match state.active_channel {
                    // Creating a channel: the creator is always part of it
                    None => state.current_user_id().map(str::to_owned).into_iter().collect(),
                    Some(_) => Vec::new(),
                };
                true
            },
            AppEvent::MemberToggled(user_id) => {
                if state.current_user_id() == Some(user_id.as_str()) {
                    return false;
                }
                let selected = &mut state.inputs.selected_members;
                if let Some(pos) = selected.iter().position(|id| *id == user_id) {
                    selected.remove(pos);
                } else {
                    selected.push(user_id);
                }
                true
            },
            AppEvent::ChannelCreated(channel) => {
                state.channels.retain(|c| c.url != channel.url);
                state.channels.insert(0, channel);
                state.application_users.clear();
                state.inputs.selected_members.clear();
                true
            },
            AppEvent::ChannelJoined { channel, mut messages } => {
                sort_chronologically(&mut messages);
                state.active_channel = Some(channel.url.clone());
                cache_channel(state, channel);
                state.messages = messages;
                state.thread = None;
                state.inputs.thread.clear();
                if state.inputs.editing.take().is_some() {
                    state.inputs.message.clear();
                }
                true
            },
            AppEvent::ChannelLeft => leave_active_channel(state),
            AppEvent::ChannelRemoved { url } => {
                let was_active = state.is_active(&url);
                let before = state.channels.len();
                state.channels.retain(|c| c.url != url);
                if was_active {
                    leave_active_channel(state);
                }
                was_active || state.channels.len() != before
            },
            AppEvent::ChannelRefreshed(channel) => {
                cache_channel(state, channel);
                true
            },
            AppEvent::MembersInvited => {
                state.application_users.clear();
                state.inputs.selected_members.clear();
                true
            },
            AppEvent::MessageSent(message) => {
                match message.parent_id {
                    None => state.inputs.message.clear(),
                    Some(_) => state.inputs.thread.clear(),
                }
                record_last_message(state, &message);
                place(state, message);
                true
            },
            AppEvent::MessageEdited(message) => {
                update_displayed(state, &message);
                // Only an edit submitted from the input consumes it
                if state.inputs.editing == Some(message.id) {
                    state.inputs.editing = None;
                    state.inputs.message.clear();
                }
                true
            },
            AppEvent::ThreadOpened(view) => {
                let same_parent = state.thread.as_ref().is_some_and(|t| t.parent.id == view.parent.id);
                if !same_parent {
                    state.inputs.thread.clear();
                }
                state.thread = Some(view);
                true
            },
            AppEvent::ThreadClosed => {
                if state.thread.take().is_none() {
                    return false;
                }
                state.inputs.thread.clear();
                true
            },
            AppEvent::MessageReceived(message) => {
                let recorded = record_last_message(state, &message);
                place(state, message) || recorded
            },
            AppEvent::MessageUpdated(message) => {
                let mut recorded = false;
                for channel in state.channels.iter_mut().filter(|c| c.url == message.channel_url) {
                    if let Some(last) = channel.last_message.as_mut().filter(|m| m.id == message.id) {
                        *last = message.clone();
                        recorded = true;
                    }
                }
                update_displayed(state, &message) || recorded
            },
            AppEvent::MessageDeleted { channel_url, message_id } => {
                delete_displayed(state, &channel_url, message_id)
            },
            AppEvent::InputChanged { target, value } => {
                match target {
                    InputTarget::Message => state.inputs.message = value,
                    InputTarget::Thread => state.inputs.thread = value,
                }
                true
            },
            AppEvent::EditStarted(message_id) => {
                let Some(text) =
                    state.find_message(message_id).and_then(Message::text).map(str::to_owned)
                else {
                    return false;
                };
                state.inputs.editing = Some(message_id);
                state.inputs.message = text;
                true
            },
            AppEvent::EditCancelled => {
                if state.inputs.editing.take().is_none() {
                    return false;
                }
                state.inputs.message.clear();
                true
            },
            AppEvent::Error { message } => {
                state.last_error = Some(message);
                true
            },
            AppEvent::ErrorDismissed => state.last_error.take().is_some(),
        }
    }
}

/// Replace a cached channel in place, or add it to the front.
fn cache_channel(state: &mut ClientState, channel: Channel) {
    match state.channels.iter_mut().find(|c| c.url == channel.url) {
        Some(slot) => *slot = channel,
        None => state.channels.insert(0, channel),
    }
}

fn leave_active_channel(state: &mut ClientState) -> bool {
    if state.active_channel.take().is_none() {
        return false;
    }
    state.messages.clear();
    state.thread = None;
    state.inputs.thread.clear();
    if state.inputs.editing.take().is_some() {
        state.inputs.message.clear();
    }
    true
}

/// Refresh `last_message` of the message's cached channel.
fn record_last_message(state: &mut ClientState, message: &Message) -> bool {
    if message.is_reply() {
        return false;
    }
    match state.channels.iter_mut().find(|c| c.url == message.channel_url) {
        Some(channel) => {
            channel.last_message = Some(message.clone());
            true
        },
        None => false,
    }
}

/// Put a message where it is displayed: the active channel's top-level list
/// or the open thread. Messages for anything not displayed are dropped.
fn place(state: &mut ClientState, message: Message) -> bool {
    match message.parent_id {
        None if state.is_active(&message.channel_url) => {
            upsert(&mut state.messages, message);
            true
        },
        None => {
            tracing::debug!(
                message_id = message.id,
                channel = %message.channel_url,
                "dropping message for inactive channel"
            );
            false
        },
        Some(parent_id) => match state.thread.as_mut() {
            Some(thread)
                if thread.parent.id == parent_id
                    && thread.parent.channel_url == message.channel_url =>
            {
                upsert(&mut thread.replies, message);
                true
            },
            _ => {
                tracing::debug!(
                    message_id = message.id,
                    parent_id,
                    "dropping reply for closed thread"
                );
                false
            },
        },
    }
}

/// Replace a displayed message in place (top-level, thread parent, replies).
fn update_displayed(state: &mut ClientState, message: &Message) -> bool {
    if !state.is_active(&message.channel_url) {
        return false;
    }
    let mut updated = replace(&mut state.messages, message);
    if let Some(thread) = state.thread.as_mut() {
        if thread.parent.id == message.id {
            thread.parent = message.clone();
            updated = true;
        }
        updated |= replace(&mut thread.replies, message);
    }
    updated
}

/// Remove a deleted message wherever it is displayed.
///
/// A deleted `last_message` falls back to the newest remaining top-level
/// message when the channel is active. Otherwise it is cleared until the
/// channel record is refetched.
fn delete_displayed(state: &mut ClientState, channel_url: &str, message_id: MessageId) -> bool {
    let active = state.is_active(channel_url);
    let mut removed = active && remove(&mut state.messages, message_id);

    let fallback = if active { state.messages.last().cloned() } else { None };
    for channel in state.channels.iter_mut().filter(|c| c.url == channel_url) {
        if channel.last_message.as_ref().is_some_and(|m| m.id == message_id) {
            channel.last_message = fallback.clone();
            removed = true;
        }
    }
    if !active {
        return removed;
    }
    if state.thread.as_ref().is_some_and(|t| t.parent.id == message_id) {
        state.thread = None;
        state.inputs.thread.clear();
        removed = true;
    } else if let Some(thread) = state.thread.as_mut() {
        removed |= remove(&mut thread.replies, message_id);
    }
    if state.inputs.editing == Some(message_id) {
        state.inputs.editing = None;
        state.inputs.message.clear();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageBody, Session, ThreadView, User};

    fn alice() -> User {
        User::new("alice", "Alice")
    }

    fn channel(url: &str) -> Channel {
        Channel {
            url: url.into(),
            name: url.into(),
            members: vec![alice(), User::new("bob", "Bob")],
            operator_ids: vec!["alice".into(), "bob".into()],
            last_message: None,
            created_at: 0,
        }
    }

    fn message(id: MessageId, channel_url: &str, parent_id: Option<MessageId>, text: &str) -> Message {
        Message {
            id,
            channel_url: channel_url.into(),
            parent_id,
            sender: alice(),
            body: MessageBody::text(text),
            created_at: id as i64 * 10,
            edited: false,
        }
    }

    fn connected_app() -> App {
        let mut app = App::new();
        app.handle(AppEvent::Connected {
            session: Session { user: alice() },
            channels: vec![channel("c1"), channel("c2")],
        });
        app
    }

    fn joined_app() -> App {
        let mut app = connected_app();
        app.handle(AppEvent::ChannelJoined {
            channel: channel("c1"),
            messages: vec![message(2, "c1", None, "second"), message(1, "c1", None, "first")],
        });
        app
    }

    fn ids(messages: &[Message]) -> Vec<MessageId> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn join_orders_messages_oldest_first() {
        let app = joined_app();
        assert_eq!(app.state().active_channel.as_deref(), Some("c1"));
        assert_eq!(ids(&app.state().messages), [1, 2]);
    }

    #[test]
    fn echo_of_sent_message_is_reconciled() {
        let mut app = joined_app();
        app.handle(AppEvent::MessageSent(message(3, "c1", None, "hi")));
        app.handle(AppEvent::MessageReceived(message(3, "c1", None, "hi")));

        assert_eq!(ids(&app.state().messages), [1, 2, 3]);
    }

    #[test]
    fn message_for_inactive_channel_is_dropped() {
        let mut app = joined_app();
        app.handle(AppEvent::MessageReceived(message(9, "c2", None, "elsewhere")));

        assert_eq!(ids(&app.state().messages), [1, 2]);
        // The channel list still shows the latest message
        let c2 = app.state().channel("c2").and_then(|c| c.last_message.clone());
        assert_eq!(c2.map(|m| m.id), Some(9));
    }

    #[test]
    fn reply_goes_to_open_thread_only() {
        let mut app = joined_app();

        let dropped = app.handle(AppEvent::MessageReceived(message(5, "c1", Some(1), "early")));
        assert!(!dropped);

        app.handle(AppEvent::ThreadOpened(ThreadView::new(message(1, "c1", None, "first"), vec![])));
        app.handle(AppEvent::MessageReceived(message(6, "c1", Some(1), "reply")));

        let thread = app.state().thread.clone().expect("thread open");
        assert_eq!(ids(&thread.replies), [6]);
        assert_eq!(ids(&app.state().messages), [1, 2]);
    }

    #[test]
    fn update_replaces_in_place() {
        let mut app = joined_app();
        let mut edited = message(1, "c1", None, "first (edited)");
        edited.edited = true;

        assert!(app.handle(AppEvent::MessageUpdated(edited)));
        assert_eq!(ids(&app.state().messages), [1, 2]);
        assert_eq!(app.state().messages[0].text(), Some("first (edited)"));

        assert!(!app.handle(AppEvent::MessageUpdated(message(42, "c1", None, "ghost"))));
    }

    #[test]
    fn deleting_thread_parent_closes_thread() {
        let mut app = joined_app();
        app.handle(AppEvent::ThreadOpened(ThreadView::new(
            message(1, "c1", None, "first"),
            vec![message(3, "c1", Some(1), "reply")],
        )));

        app.handle(AppEvent::MessageDeleted { channel_url: "c1".into(), message_id: 1 });

        assert!(app.state().thread.is_none());
        assert_eq!(ids(&app.state().messages), [2]);
    }

    #[test]
    fn delete_unknown_message_is_noop() {
        let mut app = joined_app();
        let changed = app.handle(AppEvent::MessageDeleted { channel_url: "c1".into(), message_id: 77 });
        assert!(!changed);
        assert_eq!(ids(&app.state().messages), [1, 2]);
    }

    #[test]
    fn leave_keeps_channel_cached() {
        let mut app = joined_app();
        assert!(app.handle(AppEvent::ChannelLeft));

        assert!(app.state().active_channel.is_none());
        assert!(app.state().messages.is_empty());
        assert!(app.state().channel("c1").is_some());
        assert!(!app.handle(AppEvent::ChannelLeft));
    }

    #[test]
    fn removing_active_channel_leaves_it() {
        let mut app = joined_app();
        app.handle(AppEvent::ChannelRemoved { url: "c1".into() });

        assert!(app.state().active_channel.is_none());
        assert!(app.state().channel("c1").is_none());
    }

    #[test]
    fn created_channel_is_prepended() {
        let mut app = connected_app();
        app.handle(AppEvent::ChannelCreated(channel("c3")));

        let urls: Vec<_> = app.state().channels.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, ["c3", "c1", "c2"]);
    }

    #[test]
    fn edit_prefills_and_clears_input() {
        let mut app = joined_app();
        assert!(app.handle(AppEvent::EditStarted(2)));
        assert_eq!(app.state().inputs.message, "second");

        app.handle(AppEvent::MessageEdited(message(2, "c1", None, "2nd")));
        assert_eq!(app.state().inputs.editing, None);
        assert!(app.state().inputs.message.is_empty());
        assert_eq!(app.state().messages[1].text(), Some("2nd"));
    }

    #[test]
    fn cancel_without_edit_keeps_draft() {
        let mut app = joined_app();
        app.handle(AppEvent::InputChanged { target: InputTarget::Message, value: "draft".into() });

        assert!(!app.handle(AppEvent::EditCancelled));
        assert_eq!(app.state().inputs.message, "draft");

        app.handle(AppEvent::EditStarted(1));
        assert!(app.handle(AppEvent::EditCancelled));
        assert!(app.state().inputs.message.is_empty());
    }

    #[test]
    fn closing_without_thread_keeps_reply_draft() {
        let mut app = joined_app();
        app.handle(AppEvent::InputChanged { target: InputTarget::Thread, value: "draft".into() });

        assert!(!app.handle(AppEvent::ThreadClosed));
        assert_eq!(app.state().inputs.thread, "draft");
    }

    #[test]
    fn edit_of_other_message_keeps_input() {
        let mut app = joined_app();
        app.handle(AppEvent::EditStarted(2));

        app.handle(AppEvent::MessageEdited(message(1, "c1", None, "1st")));
        assert_eq!(app.state().inputs.editing, Some(2));
        assert_eq!(app.state().inputs.message, "second");
    }

    #[test]
    fn deleting_last_message_falls_back_to_previous() {
        let mut app = joined_app();
        app.handle(AppEvent::MessageReceived(message(3, "c1", None, "third")));
        app.handle(AppEvent::MessageReceived(message(9, "c2", None, "elsewhere")));

        app.handle(AppEvent::MessageDeleted { channel_url: "c1".into(), message_id: 3 });
        let last = app.state().channel("c1").and_then(|c| c.last_message.clone());
        assert_eq!(last.map(|m| m.id), Some(2));

        assert!(app.handle(AppEvent::MessageDeleted { channel_url: "c2".into(), message_id: 9 }));
        assert!(app.state().channel("c2").is_some_and(|c| c.last_message.is_none()));
    }

    #[test]
    fn member_selection_keeps_current_user() {
        let mut app = connected_app();
        app.handle(AppEvent::UsersLoaded(vec![alice(), User::new("bob", "Bob")]));
        assert_eq!(app.state().inputs.selected_members, ["alice"]);

        assert!(!app.handle(AppEvent::MemberToggled("alice".into())));
        app.handle(AppEvent::MemberToggled("bob".into()));
        assert_eq!(app.state().inputs.selected_members, ["alice", "bob"]);
        app.handle(AppEvent::MemberToggled("bob".into()));
        assert_eq!(app.state().inputs.selected_members, ["alice"]);
    }

    #[test]
    fn old_snapshot_is_not_mutated() {
        let mut app = joined_app();
        let before = app.snapshot();

        app.handle(AppEvent::MessageReceived(message(3, "c1", None, "new")));

        assert_eq!(ids(&before.messages), [1, 2]);
        assert_eq!(ids(&app.state().messages), [1, 2, 3]);
    }

    #[test]
    fn connect_failure_resets_state() {
        let mut app = App::new();
        app.handle(AppEvent::Connecting);
        assert_eq!(app.state().connection, ConnectionState::Connecting);

        app.handle(AppEvent::ConnectFailed { message: "bad token".into() });
        assert_eq!(app.state().connection, ConnectionState::Disconnected);
        assert_eq!(app.state().last_error.as_deref(), Some("bad token"));
    }
}
