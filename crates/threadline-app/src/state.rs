//! Observable client state types.
//!
//! This module defines the data structures that represent the client's current
//! view of the chat: the [`Session`], cached [`Channel`]s, the active channel's
//! top-level [`Message`]s, the open [`ThreadView`] and the [`InputBuffers`].
//!
//! [`ClientState`] is the "View Model" handed to renderers. It is always
//! shared as an `Arc<ClientState>` snapshot; the [`crate::App`] clones it on
//! write, so a snapshot a reader holds never changes underneath it.

/// Stable user identifier assigned by the backend.
pub type UserId = String;

/// Channel identifier (the backend channel URL).
pub type ChannelUrl = String;

/// Backend-assigned message identifier.
pub type MessageId = u64;

/// Connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// `connect` in progress.
    Connecting,
    /// Session established and channel list loaded.
    Connected,
}

/// A chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable user ID.
    pub user_id: UserId,
    /// Display name.
    pub nickname: String,
    /// Profile image URL. `None` renders the nickname initial instead.
    pub profile_url: Option<String>,
}

impl User {
    /// Create a user without a profile image.
    pub fn new(user_id: impl Into<UserId>, nickname: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), nickname: nickname.into(), profile_url: None }
    }
}

/// The authenticated session. Exactly one per connected controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The connected user, with the display name applied.
    pub user: User,
}

impl Session {
    /// ID of the connected user.
    pub fn current_user_id(&self) -> &str {
        &self.user.user_id
    }

    /// Display name of the connected user.
    pub fn display_name(&self) -> &str {
        &self.user.nickname
    }
}

/// Cached, read-only copy of a backend group channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel URL.
    pub url: ChannelUrl,
    /// Channel name.
    pub name: String,
    /// Members in backend order.
    pub members: Vec<User>,
    /// Users with operator rights.
    pub operator_ids: Vec<UserId>,
    /// Most recent top-level message. `None` for empty channels.
    pub last_message: Option<Message>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl Channel {
    /// Member IDs in backend order.
    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    /// Check if the user is a member.
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    /// Check if the user is an operator.
    pub fn is_operator(&self, user_id: &str) -> bool {
        self.operator_ids.iter().any(|id| id == user_id)
    }
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text message.
    Text {
        /// Message text.
        text: String,
    },
    /// Uploaded file.
    File {
        /// Download URL assigned by the backend.
        url: String,
        /// Original file name.
        name: String,
        /// MIME type.
        mime_type: String,
        /// Size in bytes.
        size: u64,
    },
}

impl MessageBody {
    /// Text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A chat message, top-level or thread reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Backend message ID.
    pub id: MessageId,
    /// Channel the message belongs to.
    pub channel_url: ChannelUrl,
    /// Parent message for thread replies. `None` for top-level messages.
    pub parent_id: Option<MessageId>,
    /// Sender.
    pub sender: User,
    /// Content.
    pub body: MessageBody,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Message was edited after sending.
    pub edited: bool,
}

impl Message {
    /// Check if this is a thread reply.
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Text content. `None` for file messages.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text } => Some(text),
            MessageBody::File { .. } => None,
        }
    }

    /// Check if the message was sent by the given user.
    pub fn sent_by(&self, user_id: &str) -> bool {
        self.sender.user_id == user_id
    }
}

/// An open thread: the parent message and its replies.
///
/// Replies are ordered oldest to newest. The parent is never part of
/// `replies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    /// Top-level message the thread hangs off.
    pub parent: Message,
    /// Replies, oldest first.
    pub replies: Vec<Message>,
}

impl ThreadView {
    /// Build a thread view, ordering replies oldest first.
    pub fn new(parent: Message, mut replies: Vec<Message>) -> Self {
        replies.retain(|r| r.id != parent.id);
        sort_chronologically(&mut replies);
        Self { parent, replies }
    }
}

/// Which input buffer an edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    /// Channel message input.
    Message,
    /// Thread reply input.
    Thread,
}

/// Pending user input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBuffers {
    /// Channel message input.
    pub message: String,
    /// Thread reply input.
    pub thread: String,
    /// Message being edited through the channel input. `None` when composing.
    pub editing: Option<MessageId>,
    /// Users picked in the member selector.
    pub selected_members: Vec<UserId>,
}

/// Client state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    /// Connection state.
    pub connection: ConnectionState,
    /// Current session. `None` unless connected.
    pub session: Option<Session>,
    /// Cached channel list, most recently created first.
    pub channels: Vec<Channel>,
    /// Active channel. `None` if no channel is displayed.
    pub active_channel: Option<ChannelUrl>,
    /// Top-level messages of the active channel, oldest first.
    pub messages: Vec<Message>,
    /// Open thread. `None` if no thread panel is open.
    pub thread: Option<ThreadView>,
    /// Input buffers.
    pub inputs: InputBuffers,
    /// Users offered by the member selector.
    pub application_users: Vec<User>,
    /// Last error to surface to the user.
    pub last_error: Option<String>,
}

impl ClientState {
    /// ID of the connected user. `None` if disconnected.
    pub fn current_user_id(&self) -> Option<&str> {
        self.session.as_ref().map(Session::current_user_id)
    }

    /// Cached channel by URL.
    pub fn channel(&self, url: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.url == url)
    }

    /// Cached record of the active channel.
    pub fn active_channel(&self) -> Option<&Channel> {
        self.active_channel.as_deref().and_then(|url| self.channel(url))
    }

    /// Check if the given channel is the one displayed.
    pub fn is_active(&self, url: &str) -> bool {
        self.active_channel.as_deref() == Some(url)
    }

    /// Find a displayed message: top-level, thread parent or thread reply.
    pub fn find_message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id).or_else(|| {
            self.thread.as_ref().and_then(|t| {
                if t.parent.id == id { Some(&t.parent) } else { t.replies.iter().find(|r| r.id == id) }
            })
        })
    }
}

/// Insert or replace by ID. Returns `true` if an existing entry was replaced.
///
/// A message already present keeps its position (last writer wins); new
/// messages are inserted in chronological order, which is the end of the list
/// unless a push arrives after a newer local send.
pub(crate) fn upsert(list: &mut Vec<Message>, message: Message) -> bool {
    if let Some(slot) = list.iter_mut().find(|m| m.id == message.id) {
        *slot = message;
        true
    } else {
        let key = (message.created_at, message.id);
        let pos = list.partition_point(|m| (m.created_at, m.id) <= key);
        list.insert(pos, message);
        false
    }
}

/// Replace by ID in place. Returns `false` if the ID is absent.
pub(crate) fn replace(list: &mut [Message], message: &Message) -> bool {
    match list.iter_mut().find(|m| m.id == message.id) {
        Some(slot) => {
            *slot = message.clone();
            true
        },
        None => false,
    }
}

/// Remove by ID. Returns `false` if the ID is absent.
pub(crate) fn remove(list: &mut Vec<Message>, id: MessageId) -> bool {
    let before = list.len();
    list.retain(|m| m.id != id);
    list.len() != before
}

/// Order oldest to newest, ties broken by ID.
pub(crate) fn sort_chronologically(list: &mut [Message]) {
    list.sort_by_key(|m| (m.created_at, m.id));
}
