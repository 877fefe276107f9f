//! Backend trait for abstracting the chat service.
//!
//! The [`ChatBackend`] trait decouples the controller from a specific chat
//! service SDK. Each deployment implements the trait against its service, while
//! the generic [`crate::Controller`] handles all state orchestration.
//!
//! Push notifications are delivered through a [`Subscription`], an unbounded
//! queue the backend fills and the controller drains on its own schedule.

use std::future::Future;

use tokio::sync::mpsc;

use crate::{BackendError, Channel, ChannelUrl, Message, MessageId, User, UserId};

/// Channel list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelListQuery {
    /// Maximum channels returned.
    pub limit: usize,
    /// Include channels without any message.
    pub include_empty: bool,
}

/// Message window around a timestamp.
///
/// Selects up to `prev_result_size` messages at or before `timestamp` and up
/// to `next_result_size` messages after it. `inclusive` decides whether a
/// message created exactly at `timestamp` counts. Results are ordered oldest
/// to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageListQuery {
    /// Anchor in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Messages before the anchor.
    pub prev_result_size: usize,
    /// Messages after the anchor.
    pub next_result_size: usize,
    /// Count messages created exactly at the anchor.
    pub inclusive: bool,
}

impl MessageListQuery {
    /// Most recent `page_size` messages.
    pub fn latest(page_size: usize) -> Self {
        Self {
            timestamp: i64::MAX,
            prev_result_size: page_size,
            next_result_size: 0,
            inclusive: true,
        }
    }

    /// Window of `prev` and `next` messages around `timestamp`, inclusive.
    pub fn around(timestamp: i64, prev: usize, next: usize) -> Self {
        Self { timestamp, prev_result_size: prev, next_result_size: next, inclusive: true }
    }
}

/// Profile update applied after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    /// New display name.
    pub nickname: String,
    /// New profile image URL. `None` keeps the current one.
    pub profile_url: Option<String>,
}

/// Parameters for creating a group channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCreateParams {
    /// Channel name.
    pub name: String,
    /// Initial members, creator included.
    pub user_ids: Vec<UserId>,
    /// Members granted operator rights.
    pub operator_ids: Vec<UserId>,
}

/// Parameters for a text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreateParams {
    /// Message text.
    pub text: String,
    /// Parent message for thread replies.
    pub parent_id: Option<MessageId>,
}

/// File selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// File contents.
    pub data: Vec<u8>,
}

/// Parameters for a file message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMessageCreateParams {
    /// File to upload.
    pub file: FileUpload,
    /// Parent message for thread replies.
    pub parent_id: Option<MessageId>,
}

/// Push notifications delivered on the session's subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// New message in a channel the user belongs to.
    MessageReceived(Message),

    /// Message edited by its sender.
    MessageUpdated(Message),

    /// Message deleted.
    MessageDeleted {
        /// Channel the message belonged to.
        channel_url: ChannelUrl,
        /// Deleted message ID.
        message_id: MessageId,
    },

    /// Channel metadata changed.
    ChannelChanged {
        /// Affected channel.
        channel_url: ChannelUrl,
    },

    /// User joined a channel.
    MemberJoined {
        /// Affected channel.
        channel_url: ChannelUrl,
        /// User that joined.
        user: User,
    },

    /// User left a channel.
    MemberLeft {
        /// Affected channel.
        channel_url: ChannelUrl,
        /// User that left.
        user_id: UserId,
    },

    /// Channel deleted.
    ChannelDeleted {
        /// Deleted channel.
        channel_url: ChannelUrl,
    },
}

/// Receiving end of a session's push notifications.
///
/// Created by the backend with [`Subscription::channel`]; the backend keeps
/// the sender and pushes events for as long as the session lives.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<BackendEvent>,
}

impl Subscription {
    /// Create a connected sender/subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<BackendEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { events: rx })
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the backend dropped its sender. Cancel safe.
    pub async fn recv(&mut self) -> Option<BackendEvent> {
        self.events.recv().await
    }

    /// Next queued event, without waiting.
    pub fn try_recv(&mut self) -> Option<BackendEvent> {
        self.events.try_recv().ok()
    }
}

/// Abstracts the chat service the controller drives.
///
/// Implementations wrap a service SDK (or a simulation) while the generic
/// [`Controller`](crate::Controller) handles state orchestration. Every request
/// either succeeds or returns a [`BackendError`]; implementations do not
/// retry.
///
/// # Implementations
///
/// - **Simulation**: `threadline_harness::SimBackend`, an in-memory
///   multi-user service with deterministic ids and clock
/// - **Production**: a client for the hosted chat service
pub trait ChatBackend: Send + Sync + 'static {
    /// Authenticate as `user_id`, creating the user on first use.
    fn connect(&self, user_id: &str) -> impl Future<Output = Result<User, BackendError>> + Send;

    /// End the session. Pending subscriptions stop receiving events.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;

    /// Update the connected user's profile.
    fn update_user(
        &self,
        update: UserUpdate,
    ) -> impl Future<Output = Result<User, BackendError>> + Send;

    /// Choose whether channel invitations are accepted automatically.
    fn set_invitation_preference(
        &self,
        auto_accept: bool,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Users of the application, for member selection.
    fn list_users(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, BackendError>> + Send;

    /// Channels the connected user belongs to, most recent first.
    fn list_channels(
        &self,
        query: ChannelListQuery,
    ) -> impl Future<Output = Result<Vec<Channel>, BackendError>> + Send;

    /// Create a group channel.
    fn create_channel(
        &self,
        params: ChannelCreateParams,
    ) -> impl Future<Output = Result<Channel, BackendError>> + Send;

    /// Fetch a channel record.
    fn get_channel(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Channel, BackendError>> + Send;

    /// Delete a channel for every member.
    fn delete_channel(&self, url: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Add users to a channel.
    fn invite_members(
        &self,
        url: &str,
        user_ids: &[UserId],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Top-level messages of a channel, oldest first. Replies are excluded.
    fn list_messages(
        &self,
        url: &str,
        query: MessageListQuery,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    /// Send a text message.
    fn send_message(
        &self,
        url: &str,
        params: MessageCreateParams,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Upload a file and send it as a message.
    fn send_file(
        &self,
        url: &str,
        params: FileMessageCreateParams,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Replace the text of a message, keeping its ID.
    fn update_message(
        &self,
        url: &str,
        message_id: MessageId,
        text: &str,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Delete a message.
    fn delete_message(
        &self,
        url: &str,
        message_id: MessageId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Fetch a single message.
    fn get_message(
        &self,
        url: &str,
        message_id: MessageId,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;

    /// Replies to `parent_id` in the given window, oldest first.
    fn list_thread_replies(
        &self,
        url: &str,
        parent_id: MessageId,
        query: MessageListQuery,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    /// Open the push notification stream for the connected user.
    fn subscribe(&self) -> impl Future<Output = Result<Subscription, BackendError>> + Send;
}
