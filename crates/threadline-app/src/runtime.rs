//! Actor runtime for application orchestration.
//!
//! The [`Runtime`] owns a [`Controller`] on its own tokio task and serializes
//! two inputs on one timeline:
//! - [`Command`]s sent by any number of [`RuntimeHandle`]s
//! - push notifications from the controller's backend subscription
//!
//! Snapshots are observed through the `watch` receiver every handle carries.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    Channel, ChatBackend, ChatError, ClientState, Controller, FileUpload, InputTarget, Message,
    MessageId, RuntimeConfig, Session, ThreadView, User, UserId,
    command::{Command, Reply},
};

/// Actor that drives a [`Controller`].
///
/// # Type Parameters
///
/// - `B`: Chat backend the controller talks to
pub struct Runtime<B: ChatBackend> {
    controller: Controller<B>,
    commands: mpsc::Receiver<Command>,
}

enum Step {
    Command(Option<Command>),
    Push(crate::BackendEvent),
}

impl<B: ChatBackend> Runtime<B> {
    /// Create a runtime and the first handle to it.
    pub fn new(controller: Controller<B>, config: &RuntimeConfig) -> (Self, RuntimeHandle) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let handle = RuntimeHandle { commands: tx, snapshots: controller.watch() };
        (Self { controller, commands: rx }, handle)
    }

    /// Spawn the runtime on the current tokio runtime.
    pub fn spawn(controller: Controller<B>, config: &RuntimeConfig) -> RuntimeHandle {
        let (runtime, handle) = Self::new(controller, config);
        tokio::spawn(runtime.run());
        handle
    }

    /// Run the actor loop until shutdown or until every handle is dropped.
    ///
    /// The controller is disconnected before returning.
    pub async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(event) = self.controller.next_event() => Step::Push(event),
            };

            match step {
                Step::Command(None) => {
                    tracing::debug!("all runtime handles dropped");
                    break;
                },
                Step::Command(Some(Command::Shutdown { reply })) => {
                    self.controller.disconnect().await;
                    let _ = reply.send(Ok(()));
                    tracing::debug!("runtime shut down");
                    return;
                },
                Step::Command(Some(command)) => self.execute(command).await,
                Step::Push(event) => self.controller.handle_event(event).await,
            }
        }

        self.controller.disconnect().await;
    }

    async fn execute(&mut self, command: Command) {
        let c = &mut self.controller;
        match command {
            Command::Connect { user_id, display_name, reply } => {
                respond(reply, c.connect(&user_id, &display_name).await);
            },
            Command::Disconnect { reply } => {
                c.disconnect().await;
                respond(reply, Ok(()));
            },
            Command::LoadApplicationUsers { reply } => {
                respond(reply, c.load_application_users().await);
            },
            Command::ToggleMember { user_id, reply } => {
                respond(reply, c.toggle_member(&user_id));
            },
            Command::CreateChannel { name, member_ids, reply } => {
                respond(reply, c.create_channel(&name, &member_ids).await);
            },
            Command::CreateChannelFromSelection { name, reply } => {
                respond(reply, c.create_channel_from_selection(&name).await);
            },
            Command::JoinChannel { url, reply } => {
                respond(reply, c.join_channel(&url).await);
            },
            Command::LeaveChannel { reply } => {
                respond(reply, c.leave_channel());
            },
            Command::DeleteChannel { url, reply } => {
                respond(reply, c.delete_channel(&url).await);
            },
            Command::InviteMembers { url, member_ids, reply } => {
                respond(reply, c.invite_members(&url, &member_ids).await);
            },
            Command::InviteSelection { reply } => {
                respond(reply, c.invite_selection().await);
            },
            Command::SendMessage { url, body, parent_id, reply } => {
                respond(reply, c.send_message(&url, &body, parent_id).await);
            },
            Command::SendAttachment { url, file, parent_id, reply } => {
                respond(reply, c.send_attachment(&url, file, parent_id).await);
            },
            Command::EditMessage { message_id, body, reply } => {
                respond(reply, c.edit_message(message_id, &body).await);
            },
            Command::DeleteMessage { message_id, reply } => {
                respond(reply, c.delete_message(message_id).await);
            },
            Command::OpenThread { parent_id, reply } => {
                respond(reply, c.open_thread(parent_id).await);
            },
            Command::CloseThread { reply } => {
                c.close_thread();
                respond(reply, Ok(()));
            },
            Command::SetInput { target, value, reply } => {
                match target {
                    InputTarget::Message => c.set_message_input(value),
                    InputTarget::Thread => c.set_thread_input(value),
                }
                respond(reply, Ok(()));
            },
            Command::BeginEdit { message_id, reply } => {
                respond(reply, c.begin_edit(message_id));
            },
            Command::CancelEdit { reply } => {
                c.cancel_edit();
                respond(reply, Ok(()));
            },
            Command::SubmitMessageInput { reply } => {
                respond(reply, c.submit_message_input().await);
            },
            Command::SubmitThreadInput { reply } => {
                respond(reply, c.submit_thread_input().await);
            },
            Command::DismissError { reply } => {
                c.dismiss_error();
                respond(reply, Ok(()));
            },
            // Handled by the run loop
            Command::Shutdown { reply } => respond(reply, Ok(())),
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, ChatError>) {
    if reply.send(result).is_err() {
        tracing::debug!("command caller went away before the reply");
    }
}

/// Cloneable handle to a running [`Runtime`].
///
/// Every method sends one command and waits for its result. Once the actor has
/// stopped, methods return [`ChatError::RuntimeClosed`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Arc<ClientState>>,
}

impl RuntimeHandle {
    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<Arc<ClientState>> {
        self.snapshots.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<ClientState> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Check if the actor is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, ChatError> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).await.map_err(|_| ChatError::RuntimeClosed)?;
        rx.await.map_err(|_| ChatError::RuntimeClosed)?
    }

    /// See [`Controller::connect`].
    pub async fn connect(
        &self,
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
    ) -> Result<Session, ChatError> {
        let (user_id, display_name) = (user_id.into(), display_name.into());
        self.request(|reply| Command::Connect { user_id, display_name, reply }).await
    }

    /// See [`Controller::disconnect`].
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// See [`Controller::load_application_users`].
    pub async fn load_application_users(&self) -> Result<Vec<User>, ChatError> {
        self.request(|reply| Command::LoadApplicationUsers { reply }).await
    }

    /// See [`Controller::toggle_member`].
    pub async fn toggle_member(&self, user_id: impl Into<UserId>) -> Result<(), ChatError> {
        let user_id = user_id.into();
        self.request(|reply| Command::ToggleMember { user_id, reply }).await
    }

    /// See [`Controller::create_channel`].
    pub async fn create_channel(
        &self,
        name: impl Into<String>,
        member_ids: Vec<UserId>,
    ) -> Result<Channel, ChatError> {
        let name = name.into();
        self.request(|reply| Command::CreateChannel { name, member_ids, reply }).await
    }

    /// See [`Controller::create_channel_from_selection`].
    pub async fn create_channel_from_selection(
        &self,
        name: impl Into<String>,
    ) -> Result<Channel, ChatError> {
        let name = name.into();
        self.request(|reply| Command::CreateChannelFromSelection { name, reply }).await
    }

    /// See [`Controller::join_channel`].
    pub async fn join_channel(&self, url: impl Into<String>) -> Result<Vec<Message>, ChatError> {
        let url = url.into();
        self.request(|reply| Command::JoinChannel { url, reply }).await
    }

    /// See [`Controller::leave_channel`].
    pub async fn leave_channel(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::LeaveChannel { reply }).await
    }

    /// See [`Controller::delete_channel`].
    pub async fn delete_channel(&self, url: impl Into<String>) -> Result<(), ChatError> {
        let url = url.into();
        self.request(|reply| Command::DeleteChannel { url, reply }).await
    }

    /// See [`Controller::invite_members`].
    pub async fn invite_members(
        &self,
        url: impl Into<String>,
        member_ids: Vec<UserId>,
    ) -> Result<(), ChatError> {
        let url = url.into();
        self.request(|reply| Command::InviteMembers { url, member_ids, reply }).await
    }

    /// See [`Controller::invite_selection`].
    pub async fn invite_selection(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::InviteSelection { reply }).await
    }

    /// See [`Controller::send_message`].
    pub async fn send_message(
        &self,
        url: impl Into<String>,
        body: impl Into<String>,
        parent_id: Option<MessageId>,
    ) -> Result<Message, ChatError> {
        let (url, body) = (url.into(), body.into());
        self.request(|reply| Command::SendMessage { url, body, parent_id, reply }).await
    }

    /// See [`Controller::send_attachment`].
    pub async fn send_attachment(
        &self,
        url: impl Into<String>,
        file: FileUpload,
        parent_id: Option<MessageId>,
    ) -> Result<Message, ChatError> {
        let url = url.into();
        self.request(|reply| Command::SendAttachment { url, file, parent_id, reply }).await
    }

    /// See [`Controller::edit_message`].
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        body: impl Into<String>,
    ) -> Result<Message, ChatError> {
        let body = body.into();
        self.request(|reply| Command::EditMessage { message_id, body, reply }).await
    }

    /// See [`Controller::delete_message`].
    pub async fn delete_message(&self, message_id: MessageId) -> Result<(), ChatError> {
        self.request(|reply| Command::DeleteMessage { message_id, reply }).await
    }

    /// See [`Controller::open_thread`].
    pub async fn open_thread(&self, parent_id: MessageId) -> Result<ThreadView, ChatError> {
        self.request(|reply| Command::OpenThread { parent_id, reply }).await
    }

    /// See [`Controller::close_thread`].
    pub async fn close_thread(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::CloseThread { reply }).await
    }

    /// Replace the main or the thread input buffer.
    pub async fn set_input(
        &self,
        target: InputTarget,
        value: impl Into<String>,
    ) -> Result<(), ChatError> {
        let value = value.into();
        self.request(|reply| Command::SetInput { target, value, reply }).await
    }

    /// See [`Controller::begin_edit`].
    pub async fn begin_edit(&self, message_id: MessageId) -> Result<(), ChatError> {
        self.request(|reply| Command::BeginEdit { message_id, reply }).await
    }

    /// See [`Controller::cancel_edit`].
    pub async fn cancel_edit(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::CancelEdit { reply }).await
    }

    /// See [`Controller::submit_message_input`].
    pub async fn submit_message_input(&self) -> Result<Message, ChatError> {
        self.request(|reply| Command::SubmitMessageInput { reply }).await
    }

    /// See [`Controller::submit_thread_input`].
    pub async fn submit_thread_input(&self) -> Result<Message, ChatError> {
        self.request(|reply| Command::SubmitThreadInput { reply }).await
    }

    /// See [`Controller::dismiss_error`].
    pub async fn dismiss_error(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::DismissError { reply }).await
    }

    /// Disconnect and stop the actor. Other handles see
    /// [`ChatError::RuntimeClosed`] afterwards.
    pub async fn shutdown(&self) -> Result<(), ChatError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
