//! Runtime mailbox commands.
//!
//! This module defines the [`Command`] enum, the requests a
//! [`crate::RuntimeHandle`] sends to the [`crate::Runtime`] actor. Each
//! command carries a oneshot sender for the result of the matching
//! [`crate::Controller`] operation.

use tokio::sync::oneshot;

use crate::{
    Channel, ChannelUrl, ChatError, FileUpload, InputTarget, Message, MessageId, Session,
    ThreadView, User, UserId,
};

/// Reply slot for a command.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, ChatError>>;

/// Requests processed by the runtime actor, one at a time.
#[derive(Debug)]
pub(crate) enum Command {
    Connect {
        user_id: UserId,
        display_name: String,
        reply: Reply<Session>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    LoadApplicationUsers {
        reply: Reply<Vec<User>>,
    },
    ToggleMember {
        user_id: UserId,
        reply: Reply<()>,
    },
    CreateChannel {
        name: String,
        member_ids: Vec<UserId>,
        reply: Reply<Channel>,
    },
    CreateChannelFromSelection {
        name: String,
        reply: Reply<Channel>,
    },
    JoinChannel {
        url: ChannelUrl,
        reply: Reply<Vec<Message>>,
    },
    LeaveChannel {
        reply: Reply<()>,
    },
    DeleteChannel {
        url: ChannelUrl,
        reply: Reply<()>,
    },
    InviteMembers {
        url: ChannelUrl,
        member_ids: Vec<UserId>,
        reply: Reply<()>,
    },
    InviteSelection {
        reply: Reply<()>,
    },
    SendMessage {
        url: ChannelUrl,
        body: String,
        parent_id: Option<MessageId>,
        reply: Reply<Message>,
    },
    SendAttachment {
        url: ChannelUrl,
        file: FileUpload,
        parent_id: Option<MessageId>,
        reply: Reply<Message>,
    },
    EditMessage {
        message_id: MessageId,
        body: String,
        reply: Reply<Message>,
    },
    DeleteMessage {
        message_id: MessageId,
        reply: Reply<()>,
    },
    OpenThread {
        parent_id: MessageId,
        reply: Reply<ThreadView>,
    },
    CloseThread {
        reply: Reply<()>,
    },
    SetInput {
        target: InputTarget,
        value: String,
        reply: Reply<()>,
    },
    BeginEdit {
        message_id: MessageId,
        reply: Reply<()>,
    },
    CancelEdit {
        reply: Reply<()>,
    },
    SubmitMessageInput {
        reply: Reply<Message>,
    },
    SubmitThreadInput {
        reply: Reply<Message>,
    },
    DismissError {
        reply: Reply<()>,
    },
    /// Disconnect and stop the actor.
    Shutdown {
        reply: Reply<()>,
    },
}
