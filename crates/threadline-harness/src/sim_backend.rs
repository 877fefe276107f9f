//! [`ChatBackend`] implementation over a [`SimServer`].
//!
//! Each `SimBackend` is one client session of the shared server. Requests run
//! synchronously under the server lock; the returned futures are ready on
//! first poll.

use threadline_app::{
    BackendError, Channel, ChannelCreateParams, ChannelListQuery, ChatBackend,
    FileMessageCreateParams, Message, MessageCreateParams, MessageId, MessageListQuery,
    Subscription, User, UserId, UserUpdate,
};

use crate::SimServer;

/// One client connection to a [`SimServer`].
#[derive(Debug, Clone)]
pub struct SimBackend {
    server: SimServer,
    client_id: u64,
}

impl SimBackend {
    pub(crate) fn new(server: SimServer, client_id: u64) -> Self {
        Self { server, client_id }
    }
}

impl ChatBackend for SimBackend {
    async fn connect(&self, user_id: &str) -> Result<User, BackendError> {
        self.server.with_world(|w| w.connect(self.client_id, user_id))
    }

    async fn disconnect(&self) {
        self.server.with_world(|w| w.disconnect(self.client_id));
    }

    async fn update_user(&self, update: UserUpdate) -> Result<User, BackendError> {
        self.server.with_world(|w| w.update_user(self.client_id, update))
    }

    async fn set_invitation_preference(&self, auto_accept: bool) -> Result<(), BackendError> {
        self.server.with_world(|w| w.set_invitation_preference(self.client_id, auto_accept))
    }

    async fn list_users(&self, limit: usize) -> Result<Vec<User>, BackendError> {
        self.server.with_world(|w| w.list_users(self.client_id, limit))
    }

    async fn list_channels(&self, query: ChannelListQuery) -> Result<Vec<Channel>, BackendError> {
        self.server.with_world(|w| w.list_channels(self.client_id, query))
    }

    async fn create_channel(&self, params: ChannelCreateParams) -> Result<Channel, BackendError> {
        self.server.with_world(|w| w.create_channel(self.client_id, params))
    }

    async fn get_channel(&self, url: &str) -> Result<Channel, BackendError> {
        self.server.with_world(|w| w.get_channel(self.client_id, url))
    }

    async fn delete_channel(&self, url: &str) -> Result<(), BackendError> {
        self.server.with_world(|w| w.delete_channel(self.client_id, url))
    }

    async fn invite_members(&self, url: &str, user_ids: &[UserId]) -> Result<(), BackendError> {
        self.server.with_world(|w| w.invite_members(self.client_id, url, user_ids))
    }

    async fn list_messages(
        &self,
        url: &str,
        query: MessageListQuery,
    ) -> Result<Vec<Message>, BackendError> {
        self.server.with_world(|w| w.list_messages(self.client_id, url, query))
    }

    async fn send_message(
        &self,
        url: &str,
        params: MessageCreateParams,
    ) -> Result<Message, BackendError> {
        self.server.with_world(|w| w.send_message(self.client_id, url, params))
    }

    async fn send_file(
        &self,
        url: &str,
        params: FileMessageCreateParams,
    ) -> Result<Message, BackendError> {
        self.server.with_world(|w| w.send_file(self.client_id, url, params))
    }

    async fn update_message(
        &self,
        url: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<Message, BackendError> {
        self.server.with_world(|w| w.update_message(self.client_id, url, message_id, text))
    }

    async fn delete_message(&self, url: &str, message_id: MessageId) -> Result<(), BackendError> {
        self.server.with_world(|w| w.delete_message(self.client_id, url, message_id))
    }

    async fn get_message(&self, url: &str, message_id: MessageId) -> Result<Message, BackendError> {
        self.server.with_world(|w| w.get_message(self.client_id, url, message_id))
    }

    async fn list_thread_replies(
        &self,
        url: &str,
        parent_id: MessageId,
        query: MessageListQuery,
    ) -> Result<Vec<Message>, BackendError> {
        self.server.with_world(|w| w.list_thread_replies(self.client_id, url, parent_id, query))
    }

    async fn subscribe(&self) -> Result<Subscription, BackendError> {
        self.server.with_world(|w| w.subscribe(self.client_id))
    }
}
