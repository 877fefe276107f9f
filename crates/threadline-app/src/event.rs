//! Application input events.
//!
//! This module defines [`AppEvent`], the complete set of inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from two distinct sources:
//! - Results of controller operations (connected, channel joined, message
//!   sent) and user input (typing, picking members).
//! - Push notifications from the backend subscription, translated by the
//!   [`crate::Controller`].

use crate::{
    Channel, ChannelUrl, InputTarget, Message, MessageId, Session, ThreadView, User, UserId,
};

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Connection in progress.
    Connecting,

    /// Session established and channel list loaded.
    Connected {
        /// The new session.
        session: Session,
        /// First page of the user's channels.
        channels: Vec<Channel>,
    },

    /// Connection attempt failed.
    ConnectFailed {
        /// Error description.
        message: String,
    },

    /// Session ended.
    Disconnected,

    /// Member selector loaded.
    UsersLoaded(Vec<User>),

    /// User toggled a member in the selector.
    MemberToggled(UserId),

    /// Channel created by this client.
    ChannelCreated(Channel),

    /// Channel became active.
    ChannelJoined {
        /// Channel record.
        channel: Channel,
        /// Most recent top-level messages, oldest first.
        messages: Vec<Message>,
    },

    /// Active channel closed.
    ChannelLeft,

    /// Channel deleted (by us or by someone else).
    ChannelRemoved {
        /// Channel URL.
        url: ChannelUrl,
    },

    /// Fresh channel record from the backend.
    ChannelRefreshed(Channel),

    /// Invitation accepted by the backend.
    MembersInvited,

    /// Message sent by this client.
    MessageSent(Message),

    /// Message edited by this client.
    MessageEdited(Message),

    /// Thread panel opened.
    ThreadOpened(ThreadView),

    /// Thread panel closed.
    ThreadClosed,

    /// Message pushed by the backend.
    MessageReceived(Message),

    /// Message update pushed by the backend.
    MessageUpdated(Message),

    /// Message deletion pushed by the backend.
    MessageDeleted {
        /// Channel the message belonged to.
        channel_url: ChannelUrl,
        /// Deleted message ID.
        message_id: MessageId,
    },

    /// Input buffer changed.
    InputChanged {
        /// Buffer to update.
        target: InputTarget,
        /// New buffer content.
        value: String,
    },

    /// Channel input switched to editing a message.
    EditStarted(MessageId),

    /// Channel input switched back to composing.
    EditCancelled,

    /// Error occurred.
    Error {
        /// Error description.
        message: String,
    },

    /// User dismissed the error.
    ErrorDismissed,
}
