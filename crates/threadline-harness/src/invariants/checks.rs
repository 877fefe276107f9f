//! Checks over the channel, message and thread lists of each client.

use std::collections::HashSet;

use threadline_app::Message;

use super::{ClientSnapshot, Invariant, InvariantResult, SystemSnapshot, Violation};

/// Run `check` for every client, stopping at the first violation.
fn each_client(
    invariant: &'static str,
    state: &SystemSnapshot,
    check: impl Fn(&ClientSnapshot) -> Result<(), String>,
) -> InvariantResult {
    for client in &state.clients {
        check(client).map_err(|message| Violation {
            invariant,
            message: format!("client {}: {message}", client.name),
        })?;
    }
    Ok(())
}

/// Active channel must exist in the channel cache.
///
/// If `active_channel` is `Some(url)`, then `channels` must contain `url`.
/// This prevents the UI from showing a selected channel that doesn't exist.
pub struct ActiveChannelCached;

impl Invariant for ActiveChannelCached {
    fn name(&self) -> &'static str {
        "active_channel_cached"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| match &client.state.active_channel {
            Some(url) if client.state.channel(url).is_none() => {
                let cached: Vec<_> = client.state.channels.iter().map(|c| &c.url).collect();
                Err(format!("active channel {url} not in {cached:?}"))
            },
            _ => Ok(()),
        })
    }
}

/// Top-level messages belong to the active channel.
///
/// With no active channel the list is empty.
pub struct MessagesInActiveChannel;

impl Invariant for MessagesInActiveChannel {
    fn name(&self) -> &'static str {
        "messages_in_active_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| {
            let s = &client.state;
            match s.messages.iter().find(|m| !s.is_active(&m.channel_url)) {
                Some(m) => Err(format!(
                    "message {} of {} shown while {:?} is active",
                    m.id, m.channel_url, s.active_channel
                )),
                None => Ok(()),
            }
        })
    }
}

/// An open thread hangs off a message of the active channel.
pub struct ThreadRequiresActiveChannel;

impl Invariant for ThreadRequiresActiveChannel {
    fn name(&self) -> &'static str {
        "thread_requires_active_channel"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| {
            let s = &client.state;
            match &s.thread {
                Some(thread) if !s.is_active(&thread.parent.channel_url) => Err(format!(
                    "thread of message {} in {} open while {:?} is active",
                    thread.parent.id, thread.parent.channel_url, s.active_channel
                )),
                _ => Ok(()),
            }
        })
    }
}

/// No list shows a message twice.
///
/// Holds across sends and their echoes: placement is an upsert by ID.
pub struct UniqueMessageIds;

fn first_duplicate(messages: &[Message]) -> Option<u64> {
    let mut seen = HashSet::new();
    messages.iter().map(|m| m.id).find(|id| !seen.insert(*id))
}

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| {
            let s = &client.state;
            if let Some(id) = first_duplicate(&s.messages) {
                return Err(format!("message {id} listed twice"));
            }
            if let Some(id) = s.thread.as_ref().and_then(|t| first_duplicate(&t.replies)) {
                return Err(format!("reply {id} listed twice"));
            }
            Ok(())
        })
    }
}

/// Replies only appear in their own thread.
///
/// The top-level list holds no replies; every thread reply points at the
/// thread's parent; the parent is never one of its replies.
pub struct RepliesOutsideTopLevel;

impl Invariant for RepliesOutsideTopLevel {
    fn name(&self) -> &'static str {
        "replies_outside_top_level"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| {
            let s = &client.state;
            if let Some(reply) = s.messages.iter().find(|m| m.is_reply()) {
                return Err(format!("reply {} in the top-level list", reply.id));
            }
            let Some(thread) = &s.thread else { return Ok(()) };
            if thread.parent.is_reply() {
                return Err(format!("thread parent {} is a reply", thread.parent.id));
            }
            match thread.replies.iter().find(|r| r.parent_id != Some(thread.parent.id)) {
                Some(r) => Err(format!(
                    "message {} (parent {:?}) in thread of {}",
                    r.id, r.parent_id, thread.parent.id
                )),
                None => Ok(()),
            }
        })
    }
}

fn first_out_of_order(messages: &[Message]) -> Option<(&Message, &Message)> {
    messages
        .windows(2)
        .find(|pair| (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id))
        .map(|pair| (&pair[0], &pair[1]))
}

/// Top-level messages run oldest to newest.
pub struct TopLevelOrdered;

impl Invariant for TopLevelOrdered {
    fn name(&self) -> &'static str {
        "top_level_ordered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| match first_out_of_order(&client.state.messages) {
            Some((a, b)) => {
                Err(format!("message {} ({}) before {} ({})", a.id, a.created_at, b.id, b.created_at))
            },
            None => Ok(()),
        })
    }
}

/// Thread replies run oldest to newest.
pub struct RepliesOrdered;

impl Invariant for RepliesOrdered {
    fn name(&self) -> &'static str {
        "replies_ordered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        each_client(self.name(), state, |client| {
            let replies = client.state.thread.as_ref().map_or(&[][..], |t| &t.replies[..]);
            match first_out_of_order(replies) {
                Some((a, b)) => Err(format!(
                    "reply {} ({}) before {} ({})",
                    a.id, a.created_at, b.id, b.created_at
                )),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use threadline_app::{Channel, ClientState, MessageBody, ThreadView, User};

    use super::*;

    fn message(id: u64, parent_id: Option<u64>, created_at: i64) -> Message {
        Message {
            id,
            channel_url: "c1".into(),
            parent_id,
            sender: User::new("alice", "Alice"),
            body: MessageBody::text("m"),
            created_at,
            edited: false,
        }
    }

    fn joined(messages: Vec<Message>) -> ClientState {
        ClientState {
            channels: vec![Channel {
                url: "c1".into(),
                name: "general".into(),
                members: vec![],
                operator_ids: vec![],
                last_message: None,
                created_at: 0,
            }],
            active_channel: Some("c1".into()),
            messages,
            ..ClientState::default()
        }
    }

    fn system(state: ClientState) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot::new("alice", Arc::new(state)))
    }

    #[test]
    fn active_channel_must_be_cached() {
        let mut state = joined(vec![]);
        assert!(ActiveChannelCached.check(&system(state.clone())).is_ok());

        state.channels.clear();
        let violation = ActiveChannelCached.check(&system(state)).unwrap_err();
        assert_eq!(violation.invariant, "active_channel_cached");
    }

    #[test]
    fn duplicate_message_is_detected() {
        let state = joined(vec![message(1, None, 10), message(1, None, 10)]);
        assert!(UniqueMessageIds.check(&system(state)).is_err());
    }

    #[test]
    fn reply_in_top_level_list_is_detected() {
        let state = joined(vec![message(1, None, 10), message(2, Some(1), 20)]);
        assert!(RepliesOutsideTopLevel.check(&system(state)).is_err());
    }

    #[test]
    fn foreign_reply_in_thread_is_detected() {
        let mut state = joined(vec![message(1, None, 10), message(2, None, 20)]);
        state.thread = Some(ThreadView {
            parent: message(1, None, 10),
            replies: vec![message(3, Some(2), 30)],
        });
        assert!(RepliesOutsideTopLevel.check(&system(state)).is_err());
    }

    #[test]
    fn thread_outside_active_channel_is_detected() {
        let mut state = joined(vec![]);
        state.thread = Some(ThreadView::new(message(1, None, 10), vec![]));
        state.active_channel = None;
        state.messages.clear();
        assert!(ThreadRequiresActiveChannel.check(&system(state)).is_err());
    }

    #[test]
    fn ordering_is_checked() {
        let state = joined(vec![message(2, None, 20), message(1, None, 10)]);
        let violation = TopLevelOrdered.check(&system(state)).unwrap_err();
        assert!(violation.message.contains("client alice"));
    }
}
