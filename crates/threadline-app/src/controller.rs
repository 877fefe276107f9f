//! Backend-to-application orchestration.
//!
//! The [`Controller`] wraps a [`ChatBackend`] and adapts it to the application
//! lifecycle.
//!
//! # Responsibilities
//!
//! - Checks preconditions (session, active channel, open thread) before any
//!   backend request.
//! - Converts backend results into [`AppEvent`]s and feeds them to the
//!   [`App`], publishing every changed snapshot on a `watch` channel.
//! - Translates push notifications from the [`Subscription`] into
//!   [`AppEvent`]s, re-fetching channel records when membership changes.
//! - Records every failure in `last_error` without touching the rest of the
//!   state. Nothing is retried.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    App, AppEvent, BackendError, BackendEvent, Channel, ChannelCreateParams, ChannelListQuery,
    ChannelUrl, ChatBackend, ChatError, ClientState, ConnectionState, ControllerConfig,
    FileMessageCreateParams, FileUpload, InputTarget, Message, MessageCreateParams, MessageId,
    MessageListQuery, Operation, Session, Subscription, ThreadView, User, UserId, UserUpdate,
    state::sort_chronologically,
};

/// Chat session controller.
///
/// Owns the backend client, the [`App`] state machine and the push
/// subscription. Every operation takes `&mut self`, so operation results and
/// push events are applied strictly one after another.
pub struct Controller<B: ChatBackend> {
    backend: B,
    config: ControllerConfig,
    app: App,
    publisher: watch::Sender<Arc<ClientState>>,
    subscription: Option<Subscription>,
}

impl<B: ChatBackend> Controller<B> {
    /// Create a disconnected controller.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidArgument`] if the config is unusable.
    pub fn new(backend: B, config: ControllerConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let app = App::new();
        let (publisher, _) = watch::channel(app.snapshot());
        Ok(Self { backend, config, app, publisher, subscription: None })
    }

    /// Current state.
    pub fn state(&self) -> &ClientState {
        self.app.state()
    }

    /// Shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<ClientState> {
        self.app.snapshot()
    }

    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<Arc<ClientState>> {
        self.publisher.subscribe()
    }

    /// Open a session as `user_id`, shown as `display_name`.
    ///
    /// Connects, applies the invitation preference and the display name,
    /// loads the channel list and subscribes to push events. A blank display
    /// name falls back to the user ID.
    ///
    /// # Errors
    ///
    /// - [`ChatError::InvalidArgument`] for an empty user ID.
    /// - [`ChatError::InvalidState`] if a session is already active.
    /// - [`ChatError::Auth`] if the backend rejects the user or profile
    ///   update; other backend failures map per [`ChatError::from_backend`].
    ///   The backend is disconnected again before returning.
    pub async fn connect(
        &mut self,
        user_id: &str,
        display_name: &str,
    ) -> Result<Session, ChatError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(self.fail(ChatError::invalid_argument("user id must not be empty")));
        }
        let connection = self.state().connection;
        if connection != ConnectionState::Disconnected {
            return Err(
                self.fail(ChatError::InvalidState { operation: "connect".into(), state: connection })
            );
        }

        tracing::info!(user_id, "connecting");
        self.apply(AppEvent::Connecting);

        let nickname = match display_name.trim() {
            "" => user_id,
            name => name,
        };
        match establish(&self.backend, &self.config, user_id, nickname).await {
            Ok((session, channels, subscription)) => {
                tracing::info!(user_id, channels = channels.len(), "connected");
                self.subscription = Some(subscription);
                self.apply(AppEvent::Connected { session: session.clone(), channels });
                Ok(session)
            },
            Err(err) => {
                tracing::warn!(user_id, error = %err, "connect failed");
                self.backend.disconnect().await;
                self.apply(AppEvent::ConnectFailed { message: err.to_string() });
                Err(err)
            },
        }
    }

    /// End the session and reset the state. No-op while disconnected.
    pub async fn disconnect(&mut self) {
        if self.state().connection == ConnectionState::Disconnected && self.subscription.is_none()
        {
            return;
        }
        self.subscription = None;
        self.backend.disconnect().await;
        self.apply(AppEvent::Disconnected);
        tracing::info!("disconnected");
    }

    /// Load the users offered by the member selector.
    ///
    /// With no active channel the selection starts with the current user
    /// (channel creation); otherwise it starts empty (invitation).
    pub async fn load_application_users(&mut self) -> Result<Vec<User>, ChatError> {
        self.require_connected("list users")?;
        let users = self
            .backend
            .list_users(self.config.user_page_size)
            .await
            .map_err(|e| self.fail_backend(Operation::ListUsers, e))?;
        self.apply(AppEvent::UsersLoaded(users.clone()));
        Ok(users)
    }

    /// Add a user to the member selection, or remove it if already picked.
    pub fn toggle_member(&mut self, user_id: &str) -> Result<(), ChatError> {
        self.require_connected("pick members")?;
        self.apply(AppEvent::MemberToggled(user_id.to_owned()));
        Ok(())
    }

    /// Create a group channel with the current user and `member_ids`.
    ///
    /// Every member, the creator included, is made an operator.
    ///
    /// # Errors
    ///
    /// [`ChatError::InvalidArgument`] unless at least one member besides the
    /// current user is given.
    pub async fn create_channel(
        &mut self,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<Channel, ChatError> {
        let me = self.require_connected("create channel")?;

        let mut user_ids = vec![me];
        for id in member_ids {
            if !user_ids.contains(id) {
                user_ids.push(id.clone());
            }
        }
        if user_ids.len() < 2 {
            return Err(
                self.fail(ChatError::invalid_argument("a channel needs at least one other member"))
            );
        }

        let params = ChannelCreateParams {
            name: name.trim().to_owned(),
            operator_ids: user_ids.clone(),
            user_ids,
        };
        let channel = self
            .backend
            .create_channel(params)
            .await
            .map_err(|e| self.fail_backend(Operation::CreateChannel, e))?;

        tracing::info!(channel = %channel.url, members = channel.members.len(), "channel created");
        self.apply(AppEvent::ChannelCreated(channel.clone()));
        Ok(channel)
    }

    /// Create a channel with the members picked in the selector.
    pub async fn create_channel_from_selection(&mut self, name: &str) -> Result<Channel, ChatError> {
        let selected = self.state().inputs.selected_members.clone();
        self.create_channel(name, &selected).await
    }

    /// Make `url` the active channel and load its most recent messages.
    ///
    /// Returns the top-level messages, oldest first.
    pub async fn join_channel(&mut self, url: &str) -> Result<Vec<Message>, ChatError> {
        self.require_connected("join channel")?;

        let channel = match self.state().channel(url).cloned() {
            Some(channel) => channel,
            None => self
                .backend
                .get_channel(url)
                .await
                .map_err(|e| self.fail_backend(Operation::JoinChannel, e))?,
        };
        let query = MessageListQuery::latest(self.config.message_page_size);
        let mut messages = self
            .backend
            .list_messages(url, query)
            .await
            .map_err(|e| self.fail_backend(Operation::JoinChannel, e))?;
        messages.retain(|m| !m.is_reply());
        sort_chronologically(&mut messages);

        tracing::info!(channel = url, messages = messages.len(), "channel joined");
        self.apply(AppEvent::ChannelJoined { channel, messages: messages.clone() });
        Ok(messages)
    }

    /// Stop displaying the active channel. The backend channel is untouched.
    pub fn leave_channel(&mut self) -> Result<(), ChatError> {
        self.require_connected("leave channel")?;
        self.apply(AppEvent::ChannelLeft);
        Ok(())
    }

    /// Delete a channel for every member.
    ///
    /// The channel leaves the cache only once the backend confirms.
    pub async fn delete_channel(&mut self, url: &str) -> Result<(), ChatError> {
        self.require_connected("delete channel")?;
        self.backend
            .delete_channel(url)
            .await
            .map_err(|e| self.fail_backend(Operation::DeleteChannel, e))?;

        tracing::info!(channel = url, "channel deleted");
        self.apply(AppEvent::ChannelRemoved { url: url.to_owned() });
        Ok(())
    }

    /// Invite users into a channel.
    ///
    /// The cached member list is refreshed later by the resulting
    /// [`BackendEvent::MemberJoined`] pushes.
    pub async fn invite_members(&mut self, url: &str, member_ids: &[UserId]) -> Result<(), ChatError> {
        self.require_connected("invite members")?;
        if member_ids.is_empty() {
            return Err(self.fail(ChatError::invalid_argument("no members to invite")));
        }
        self.backend
            .invite_members(url, member_ids)
            .await
            .map_err(|e| self.fail_backend(Operation::InviteMembers, e))?;

        tracing::info!(channel = url, invited = member_ids.len(), "members invited");
        self.apply(AppEvent::MembersInvited);
        Ok(())
    }

    /// Invite the picked members into the active channel.
    pub async fn invite_selection(&mut self) -> Result<(), ChatError> {
        let me = self.require_connected("invite members")?;
        let url = self.require_active_channel("invite members")?;
        let selected: Vec<UserId> =
            self.state().inputs.selected_members.iter().filter(|id| **id != me).cloned().collect();
        self.invite_members(&url, &selected).await
    }

    /// Send a text message to the active channel, or a reply to the open
    /// thread when `parent_id` is set.
    ///
    /// # Errors
    ///
    /// [`ChatError::Send`] if the backend refuses the message.
    pub async fn send_message(
        &mut self,
        url: &str,
        body: &str,
        parent_id: Option<MessageId>,
    ) -> Result<Message, ChatError> {
        self.require_target("send message", url, parent_id)?;
        if body.trim().is_empty() {
            return Err(self.fail(ChatError::invalid_argument("message must not be empty")));
        }

        let params = MessageCreateParams { text: body.to_owned(), parent_id };
        let message = self
            .backend
            .send_message(url, params)
            .await
            .map_err(|e| self.fail_backend(Operation::SendMessage, e))?;

        tracing::debug!(channel = url, message_id = message.id, parent_id, "message sent");
        self.apply(AppEvent::MessageSent(message.clone()));
        Ok(message)
    }

    /// Upload a file as a message, placed like [`Controller::send_message`].
    ///
    /// # Errors
    ///
    /// [`ChatError::Upload`] if the backend refuses the file.
    pub async fn send_attachment(
        &mut self,
        url: &str,
        file: FileUpload,
        parent_id: Option<MessageId>,
    ) -> Result<Message, ChatError> {
        self.require_target("send attachment", url, parent_id)?;
        if file.name.trim().is_empty() {
            return Err(self.fail(ChatError::invalid_argument("file name must not be empty")));
        }

        let params = FileMessageCreateParams { file, parent_id };
        let message = self
            .backend
            .send_file(url, params)
            .await
            .map_err(|e| self.fail_backend(Operation::SendAttachment, e))?;

        tracing::debug!(channel = url, message_id = message.id, parent_id, "file sent");
        self.apply(AppEvent::MessageSent(message.clone()));
        Ok(message)
    }

    /// Replace the text of a displayed message.
    ///
    /// The message keeps its ID and its position in the list.
    ///
    /// # Errors
    ///
    /// - [`ChatError::NotFound`] if the message is not displayed.
    /// - [`ChatError::Edit`] for file messages and backend refusals.
    pub async fn edit_message(
        &mut self,
        message_id: MessageId,
        new_body: &str,
    ) -> Result<Message, ChatError> {
        self.require_connected("edit message")?;
        let message = self.require_displayed(message_id)?;
        if message.text().is_none() {
            return Err(
                self.fail(ChatError::Edit { reason: "file messages cannot be edited".into() })
            );
        }
        if new_body.trim().is_empty() {
            return Err(self.fail(ChatError::invalid_argument("message must not be empty")));
        }

        let updated = self
            .backend
            .update_message(&message.channel_url, message_id, new_body)
            .await
            .map_err(|e| self.fail_backend(Operation::EditMessage, e))?;

        tracing::debug!(channel = %updated.channel_url, message_id, "message edited");
        self.apply(AppEvent::MessageEdited(updated.clone()));
        Ok(updated)
    }

    /// Delete a displayed message.
    ///
    /// Local lists change only when the backend pushes
    /// [`BackendEvent::MessageDeleted`].
    pub async fn delete_message(&mut self, message_id: MessageId) -> Result<(), ChatError> {
        self.require_connected("delete message")?;
        let message = self.require_displayed(message_id)?;
        self.backend
            .delete_message(&message.channel_url, message_id)
            .await
            .map_err(|e| self.fail_backend(Operation::DeleteMessage, e))?;

        tracing::debug!(channel = %message.channel_url, message_id, "message delete requested");
        Ok(())
    }

    /// Open the thread of a top-level message in the active channel.
    ///
    /// Fetches the current parent and the replies around its timestamp.
    pub async fn open_thread(&mut self, parent_id: MessageId) -> Result<ThreadView, ChatError> {
        self.require_connected("open thread")?;
        let url = self.require_active_channel("open thread")?;
        let parent = self.require_displayed(parent_id)?;
        if parent.is_reply() {
            return Err(self.fail(ChatError::invalid_argument("replies have no thread")));
        }

        let parent = self
            .backend
            .get_message(&url, parent_id)
            .await
            .map_err(|e| self.fail_backend(Operation::OpenThread, e))?;
        let query = MessageListQuery::around(
            parent.created_at,
            self.config.thread_prev_size,
            self.config.thread_next_size,
        );
        let replies = self
            .backend
            .list_thread_replies(&url, parent_id, query)
            .await
            .map_err(|e| self.fail_backend(Operation::OpenThread, e))?;

        let view = ThreadView::new(parent, replies);
        tracing::debug!(channel = %url, parent_id, replies = view.replies.len(), "thread opened");
        self.apply(AppEvent::ThreadOpened(view.clone()));
        Ok(view)
    }

    /// Close the thread panel.
    pub fn close_thread(&mut self) {
        self.apply(AppEvent::ThreadClosed);
    }

    /// Replace the channel input.
    pub fn set_message_input(&mut self, value: impl Into<String>) {
        self.apply(AppEvent::InputChanged { target: InputTarget::Message, value: value.into() });
    }

    /// Replace the thread reply input.
    pub fn set_thread_input(&mut self, value: impl Into<String>) {
        self.apply(AppEvent::InputChanged { target: InputTarget::Thread, value: value.into() });
    }

    /// Switch the channel input to editing one of the user's text messages.
    pub fn begin_edit(&mut self, message_id: MessageId) -> Result<(), ChatError> {
        let me = self.require_connected("edit message")?;
        let message = self.require_displayed(message_id)?;
        if message.text().is_none() {
            return Err(
                self.fail(ChatError::Edit { reason: "file messages cannot be edited".into() })
            );
        }
        if !message.sent_by(&me) {
            return Err(self.fail(ChatError::Permission {
                reason: "only the sender can edit a message".into(),
            }));
        }
        self.apply(AppEvent::EditStarted(message_id));
        Ok(())
    }

    /// Switch the channel input back to composing.
    pub fn cancel_edit(&mut self) {
        self.apply(AppEvent::EditCancelled);
    }

    /// Submit the channel input: edits the message being edited, otherwise
    /// sends a new message to the active channel.
    pub async fn submit_message_input(&mut self) -> Result<Message, ChatError> {
        let text = self.state().inputs.message.clone();
        if text.trim().is_empty() {
            return Err(self.fail(ChatError::invalid_argument("message must not be empty")));
        }
        match self.state().inputs.editing {
            Some(message_id) => self.edit_message(message_id, &text).await,
            None => {
                let url = self.require_active_channel("send message")?;
                self.send_message(&url, &text, None).await
            },
        }
    }

    /// Submit the thread input as a reply to the open thread.
    pub async fn submit_thread_input(&mut self) -> Result<Message, ChatError> {
        let text = self.state().inputs.thread.clone();
        if text.trim().is_empty() {
            return Err(self.fail(ChatError::invalid_argument("reply must not be empty")));
        }
        let Some((url, parent_id)) =
            self.state().thread.as_ref().map(|t| (t.parent.channel_url.clone(), t.parent.id))
        else {
            return Err(self.fail(ChatError::invalid_argument("no thread is open")));
        };
        self.send_message(&url, &text, Some(parent_id)).await
    }

    /// Clear the displayed error.
    pub fn dismiss_error(&mut self) {
        self.apply(AppEvent::ErrorDismissed);
    }

    /// Apply a push notification.
    ///
    /// Channel events, and deletes of a channel's last message, re-fetch the
    /// channel record. Failures are logged and swallowed.
    pub async fn handle_event(&mut self, event: BackendEvent) {
        if self.state().connection != ConnectionState::Connected {
            tracing::debug!(?event, "ignoring push while disconnected");
            return;
        }

        match event {
            BackendEvent::MessageReceived(message) => {
                self.apply(AppEvent::MessageReceived(message));
            },
            BackendEvent::MessageUpdated(message) => {
                self.apply(AppEvent::MessageUpdated(message));
            },
            BackendEvent::MessageDeleted { channel_url, message_id } => {
                let was_last = self
                    .state()
                    .channel(&channel_url)
                    .and_then(|c| c.last_message.as_ref())
                    .is_some_and(|m| m.id == message_id);
                self.apply(AppEvent::MessageDeleted { channel_url: channel_url.clone(), message_id });
                if was_last {
                    self.refresh_channel(channel_url).await;
                }
            },
            BackendEvent::ChannelChanged { channel_url }
            | BackendEvent::MemberJoined { channel_url, .. }
            | BackendEvent::MemberLeft { channel_url, .. } => {
                self.refresh_channel(channel_url).await;
            },
            BackendEvent::ChannelDeleted { channel_url } => {
                tracing::info!(channel = %channel_url, "channel deleted remotely");
                self.apply(AppEvent::ChannelRemoved { url: channel_url });
            },
        }
    }

    async fn refresh_channel(&mut self, url: ChannelUrl) {
        match self.backend.get_channel(&url).await {
            Ok(channel) => {
                self.apply(AppEvent::ChannelRefreshed(channel));
            },
            // No longer visible to us: deleted, or we were removed
            Err(BackendError::NotFound { .. } | BackendError::Forbidden { .. }) => {
                tracing::info!(channel = %url, "channel no longer available");
                self.apply(AppEvent::ChannelRemoved { url });
            },
            Err(err) => {
                tracing::warn!(channel = %url, error = %err, "failed to refresh channel");
            },
        }
    }

    /// Wait for the next push notification.
    ///
    /// Pending forever while there is no subscription. Returns `None` once the
    /// backend closed the subscription. Cancel safe.
    pub async fn next_event(&mut self) -> Option<BackendEvent> {
        let event = match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => std::future::pending().await,
        };
        if event.is_none() {
            tracing::warn!("push subscription closed");
            self.subscription = None;
        }
        event
    }

    /// Apply every queued push notification without waiting.
    ///
    /// Returns the number of events applied.
    pub async fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            self.handle_event(event).await;
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, event: AppEvent) {
        if self.app.handle(event) {
            self.publisher.send_replace(self.app.snapshot());
        }
    }

    /// Record an error for display and hand it back.
    fn fail(&mut self, err: ChatError) -> ChatError {
        tracing::debug!(error = %err, "operation failed");
        self.apply(AppEvent::Error { message: err.to_string() });
        err
    }

    fn fail_backend(&mut self, operation: Operation, err: BackendError) -> ChatError {
        self.fail(ChatError::from_backend(operation, err))
    }

    /// ID of the connected user, or [`ChatError::InvalidState`].
    fn require_connected(&mut self, operation: &str) -> Result<UserId, ChatError> {
        let state = self.state();
        if let (ConnectionState::Connected, Some(me)) = (state.connection, state.current_user_id())
        {
            return Ok(me.to_owned());
        }
        let connection = state.connection;
        Err(self.fail(ChatError::InvalidState { operation: operation.to_owned(), state: connection }))
    }

    fn require_active_channel(&mut self, operation: &str) -> Result<ChannelUrl, ChatError> {
        match self.state().active_channel.clone() {
            Some(url) => Ok(url),
            None => Err(self.fail(ChatError::invalid_argument(format!(
                "cannot {operation} without an active channel"
            )))),
        }
    }

    fn require_displayed(&mut self, message_id: MessageId) -> Result<Message, ChatError> {
        match self.state().find_message(message_id).cloned() {
            Some(message) => Ok(message),
            None => {
                Err(self.fail(ChatError::NotFound { what: format!("message {message_id}") }))
            },
        }
    }

    /// Messages go to the active channel; replies to the open thread.
    fn require_target(
        &mut self,
        operation: &str,
        url: &str,
        parent_id: Option<MessageId>,
    ) -> Result<(), ChatError> {
        self.require_connected(operation)?;
        if !self.state().is_active(url) {
            return Err(
                self.fail(ChatError::invalid_argument(format!("channel {url} is not active")))
            );
        }
        if let Some(parent_id) = parent_id {
            let open = self
                .state()
                .thread
                .as_ref()
                .is_some_and(|t| t.parent.id == parent_id && t.parent.channel_url == url);
            if !open {
                return Err(self.fail(ChatError::invalid_argument(format!(
                    "thread {parent_id} is not open"
                ))));
            }
        }
        Ok(())
    }
}

/// Session setup for [`Controller::connect`].
async fn establish<B: ChatBackend>(
    backend: &B,
    config: &ControllerConfig,
    user_id: &str,
    nickname: &str,
) -> Result<(Session, Vec<Channel>, Subscription), ChatError> {
    let auth = |e: BackendError| ChatError::from_backend(Operation::Connect, e);

    backend.connect(user_id).await.map_err(auth)?;
    backend.set_invitation_preference(config.auto_accept_invitations).await.map_err(auth)?;
    let user = backend
        .update_user(UserUpdate { nickname: nickname.to_owned(), profile_url: None })
        .await
        .map_err(auth)?;

    let query = ChannelListQuery {
        limit: config.channel_page_size,
        include_empty: config.include_empty_channels,
    };
    let channels = backend
        .list_channels(query)
        .await
        .map_err(|e| ChatError::from_backend(Operation::ListChannels, e))?;
    let subscription = backend.subscribe().await.map_err(auth)?;

    Ok((Session { user }, channels, subscription))
}
