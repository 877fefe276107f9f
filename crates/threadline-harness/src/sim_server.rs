//! In-memory chat service for deterministic testing.
//!
//! `SimServer` holds one shared world (users, channels, messages, sessions)
//! behind a mutex. Channel URLs come from a seeded `ChaCha8Rng` and
//! timestamps from a logical clock that advances on every write, so the same
//! seed and the same calls always produce the same state.
//!
//! Clients are created with [`SimServer::client`]; each one is a
//! [`crate::SimBackend`] with its own session and push subscribers.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use threadline_app::{
    BackendError, BackendEvent, Channel, ChannelCreateParams, ChannelListQuery, ChannelUrl,
    FileMessageCreateParams, Message, MessageBody, MessageCreateParams, MessageId,
    MessageListQuery, Subscription, User, UserId, UserUpdate,
};
use tokio::sync::mpsc;

use crate::SimBackend;

/// Logical clock origin (2023-11-14 22:13:20 UTC) in milliseconds.
pub const CLOCK_START_MS: i64 = 1_700_000_000_000;

/// Logical clock advance per write.
pub const CLOCK_STEP_MS: i64 = 1_000;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Backend request kinds, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOperation {
    /// `connect`
    Connect,
    /// `update_user`
    UpdateUser,
    /// `set_invitation_preference`
    SetInvitationPreference,
    /// `list_users`
    ListUsers,
    /// `list_channels`
    ListChannels,
    /// `create_channel`
    CreateChannel,
    /// `get_channel`
    GetChannel,
    /// `delete_channel`
    DeleteChannel,
    /// `invite_members`
    InviteMembers,
    /// `list_messages`
    ListMessages,
    /// `send_message`
    SendMessage,
    /// `send_file`
    SendFile,
    /// `update_message`
    UpdateMessage,
    /// `delete_message`
    DeleteMessage,
    /// `get_message`
    GetMessage,
    /// `list_thread_replies`
    ListThreadReplies,
    /// `subscribe`
    Subscribe,
}

/// Simulated chat service shared by any number of clients.
///
/// Cloning is cheap; clones share the same world.
#[derive(Clone)]
pub struct SimServer {
    world: Arc<Mutex<World>>,
}

impl std::fmt::Debug for SimServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimServer").finish_non_exhaustive()
    }
}

impl SimServer {
    /// Create an empty server with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self { world: Arc::new(Mutex::new(World::new(seed))) }
    }

    /// Create a disconnected client of this server.
    pub fn client(&self) -> SimBackend {
        let client_id = self.with_world(World::open_client);
        SimBackend::new(self.clone(), client_id)
    }

    /// Register a user without connecting, e.g. a peer offered by the member
    /// selector.
    pub fn register_user(&self, user_id: &str, nickname: &str) {
        self.with_world(|w| {
            w.users.entry(user_id.to_owned()).or_insert_with(|| UserRecord::new(user_id)).user.nickname =
                nickname.to_owned();
        });
    }

    /// Also push a client's own messages and edits back to it.
    pub fn set_echo(&self, echo: bool) {
        self.with_world(|w| w.echo = echo);
    }

    /// Fail the next request of the given kind with `error`.
    ///
    /// Faults are consumed in the order they were queued.
    pub fn fail_next(&self, operation: SimOperation, error: BackendError) {
        self.with_world(|w| w.faults.push_back((operation, error)));
    }

    /// URLs of every channel, sorted.
    pub fn channel_urls(&self) -> Vec<ChannelUrl> {
        self.with_world(|w| w.channels.keys().cloned().collect())
    }

    /// Every stored message of a channel, replies included, in creation order.
    pub fn messages(&self, url: &str) -> Vec<Message> {
        self.with_world(|w| w.messages.get(url).cloned().unwrap_or_default())
    }

    /// Whether the user accepts invitations automatically.
    pub fn auto_accepts_invitations(&self, user_id: &str) -> Option<bool> {
        self.with_world(|w| w.users.get(user_id).map(|u| u.auto_accept))
    }

    /// Number of live push subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.with_world(|w| {
            w.clients.values().map(|c| c.subscribers.iter().filter(|s| !s.is_closed()).count()).sum()
        })
    }

    /// Run `f` with exclusive access to the world. Never held across an await.
    pub(crate) fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut world = self.world.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut world)
    }
}

struct UserRecord {
    user: User,
    auto_accept: bool,
}

impl UserRecord {
    fn new(user_id: &str) -> Self {
        Self { user: User::new(user_id, user_id), auto_accept: true }
    }
}

struct ChannelRecord {
    url: ChannelUrl,
    name: String,
    members: Vec<UserId>,
    operator_ids: Vec<UserId>,
    created_at: i64,
}

#[derive(Default)]
struct ClientSession {
    user_id: Option<UserId>,
    subscribers: Vec<mpsc::UnboundedSender<BackendEvent>>,
}

/// Server-side state. Every request is one method call under the lock.
pub(crate) struct World {
    rng: ChaCha8Rng,
    clock: i64,
    next_message_id: MessageId,
    next_client_id: u64,
    echo: bool,
    users: BTreeMap<UserId, UserRecord>,
    channels: BTreeMap<ChannelUrl, ChannelRecord>,
    messages: BTreeMap<ChannelUrl, Vec<Message>>,
    clients: BTreeMap<u64, ClientSession>,
    faults: VecDeque<(SimOperation, BackendError)>,
}

impl World {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock: CLOCK_START_MS,
            next_message_id: 1,
            next_client_id: 1,
            echo: false,
            users: BTreeMap::new(),
            channels: BTreeMap::new(),
            messages: BTreeMap::new(),
            clients: BTreeMap::new(),
            faults: VecDeque::new(),
        }
    }

    fn open_client(&mut self) -> u64 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, ClientSession::default());
        id
    }

    fn tick(&mut self) -> i64 {
        self.clock += CLOCK_STEP_MS;
        self.clock
    }

    fn take_fault(&mut self, operation: SimOperation) -> Result<(), BackendError> {
        let Some(pos) = self.faults.iter().position(|(op, _)| *op == operation) else {
            return Ok(());
        };
        match self.faults.remove(pos) {
            Some((_, error)) => {
                tracing::debug!(?operation, %error, "injected fault");
                Err(error)
            },
            None => Ok(()),
        }
    }

    fn session_user(&self, client: u64) -> Result<UserId, BackendError> {
        self.clients
            .get(&client)
            .and_then(|c| c.user_id.clone())
            .ok_or_else(|| BackendError::Unauthorized { reason: "not connected".into() })
    }

    fn user(&self, user_id: &str) -> User {
        self.users.get(user_id).map_or_else(|| User::new(user_id, user_id), |r| r.user.clone())
    }

    /// Channel visible to `user_id`.
    fn member_channel(&self, url: &str, user_id: &str) -> Result<&ChannelRecord, BackendError> {
        let record = self
            .channels
            .get(url)
            .ok_or_else(|| BackendError::NotFound { what: format!("channel {url}") })?;
        if !record.members.iter().any(|m| m == user_id) {
            return Err(BackendError::Forbidden { reason: format!("{user_id} is not a member") });
        }
        Ok(record)
    }

    fn render_channel(&self, record: &ChannelRecord) -> Channel {
        Channel {
            url: record.url.clone(),
            name: record.name.clone(),
            members: record.members.iter().map(|id| self.user(id)).collect(),
            operator_ids: record.operator_ids.clone(),
            last_message: self
                .messages
                .get(&record.url)
                .and_then(|ms| ms.iter().rev().find(|m| !m.is_reply()).cloned()),
            created_at: record.created_at,
        }
    }

    fn find_message(&self, url: &str, message_id: MessageId) -> Result<&Message, BackendError> {
        self.messages
            .get(url)
            .and_then(|ms| ms.iter().find(|m| m.id == message_id))
            .ok_or_else(|| BackendError::NotFound { what: format!("message {message_id}") })
    }

    /// Push `event` to every subscriber of the given users, except the
    /// `exclude` client.
    fn notify(&mut self, users: &[UserId], exclude: Option<u64>, event: &BackendEvent) {
        for (id, session) in &mut self.clients {
            if Some(*id) == exclude {
                continue;
            }
            let Some(user_id) = &session.user_id else { continue };
            if !users.contains(user_id) {
                continue;
            }
            session.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Members and the client to skip for a fan-out of the actor's own write.
    fn audience(&self, url: &str, actor: u64) -> (Vec<UserId>, Option<u64>) {
        let members = self.channels.get(url).map(|c| c.members.clone()).unwrap_or_default();
        (members, if self.echo { None } else { Some(actor) })
    }

    fn unique_channel_url(&mut self) -> ChannelUrl {
        loop {
            let url = format!("sim_group_channel_{:08x}", self.rng.r#gen::<u32>());
            if !self.channels.contains_key(&url) {
                return url;
            }
        }
    }

    pub(crate) fn connect(&mut self, client: u64, user_id: &str) -> Result<User, BackendError> {
        self.take_fault(SimOperation::Connect)?;
        if user_id.is_empty() {
            return Err(BackendError::Unauthorized { reason: "empty user id".into() });
        }
        let user =
            self.users.entry(user_id.to_owned()).or_insert_with(|| UserRecord::new(user_id)).user.clone();
        self.clients.entry(client).or_default().user_id = Some(user_id.to_owned());
        Ok(user)
    }

    pub(crate) fn disconnect(&mut self, client: u64) {
        if let Some(session) = self.clients.get_mut(&client) {
            session.user_id = None;
            session.subscribers.clear();
        }
    }

    pub(crate) fn update_user(&mut self, client: u64, update: UserUpdate) -> Result<User, BackendError> {
        self.take_fault(SimOperation::UpdateUser)?;
        let me = self.session_user(client)?;
        let record = self.users.entry(me.clone()).or_insert_with(|| UserRecord::new(&me));
        record.user.nickname = update.nickname;
        if update.profile_url.is_some() {
            record.user.profile_url = update.profile_url;
        }
        Ok(record.user.clone())
    }

    pub(crate) fn set_invitation_preference(
        &mut self,
        client: u64,
        auto_accept: bool,
    ) -> Result<(), BackendError> {
        self.take_fault(SimOperation::SetInvitationPreference)?;
        let me = self.session_user(client)?;
        self.users.entry(me.clone()).or_insert_with(|| UserRecord::new(&me)).auto_accept =
            auto_accept;
        Ok(())
    }

    pub(crate) fn list_users(&mut self, client: u64, limit: usize) -> Result<Vec<User>, BackendError> {
        self.take_fault(SimOperation::ListUsers)?;
        self.session_user(client)?;
        Ok(self.users.values().take(limit).map(|r| r.user.clone()).collect())
    }

    pub(crate) fn list_channels(
        &mut self,
        client: u64,
        query: ChannelListQuery,
    ) -> Result<Vec<Channel>, BackendError> {
        self.take_fault(SimOperation::ListChannels)?;
        let me = self.session_user(client)?;
        let mut channels: Vec<Channel> = self
            .channels
            .values()
            .filter(|c| c.members.contains(&me))
            .map(|c| self.render_channel(c))
            .filter(|c| query.include_empty || c.last_message.is_some())
            .collect();
        channels.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.url.cmp(&b.url)));
        channels.truncate(query.limit);
        Ok(channels)
    }

    pub(crate) fn create_channel(
        &mut self,
        client: u64,
        params: ChannelCreateParams,
    ) -> Result<Channel, BackendError> {
        self.take_fault(SimOperation::CreateChannel)?;
        let me = self.session_user(client)?;
        if let Some(unknown) = params.user_ids.iter().find(|id| !self.users.contains_key(*id)) {
            return Err(BackendError::NotFound { what: format!("user {unknown}") });
        }

        let mut members = vec![me];
        for id in params.user_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        let operator_ids: Vec<UserId> =
            params.operator_ids.into_iter().filter(|id| members.contains(id)).collect();
        let name = match params.name.trim() {
            "" => "Group Channel".to_owned(),
            name => name.to_owned(),
        };

        let url = self.unique_channel_url();
        let created_at = self.tick();
        let record = ChannelRecord { url: url.clone(), name, members, operator_ids, created_at };
        let channel = self.render_channel(&record);
        let members = record.members.clone();
        self.channels.insert(url.clone(), record);
        self.messages.insert(url.clone(), Vec::new());

        self.notify(&members, Some(client), &BackendEvent::ChannelChanged { channel_url: url });
        Ok(channel)
    }

    pub(crate) fn get_channel(&mut self, client: u64, url: &str) -> Result<Channel, BackendError> {
        self.take_fault(SimOperation::GetChannel)?;
        let me = self.session_user(client)?;
        let record = self.member_channel(url, &me)?;
        Ok(self.render_channel(record))
    }

    pub(crate) fn delete_channel(&mut self, client: u64, url: &str) -> Result<(), BackendError> {
        self.take_fault(SimOperation::DeleteChannel)?;
        let me = self.session_user(client)?;
        let record = self.member_channel(url, &me)?;
        if !record.operator_ids.contains(&me) {
            return Err(BackendError::Forbidden {
                reason: "only operators can delete a channel".into(),
            });
        }
        let members = record.members.clone();
        self.channels.remove(url);
        self.messages.remove(url);

        self.notify(&members, None, &BackendEvent::ChannelDeleted { channel_url: url.to_owned() });
        Ok(())
    }

    pub(crate) fn invite_members(
        &mut self,
        client: u64,
        url: &str,
        user_ids: &[UserId],
    ) -> Result<(), BackendError> {
        self.take_fault(SimOperation::InviteMembers)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        if let Some(unknown) = user_ids.iter().find(|id| !self.users.contains_key(*id)) {
            return Err(BackendError::NotFound { what: format!("user {unknown}") });
        }

        let mut joined = Vec::new();
        if let Some(record) = self.channels.get_mut(url) {
            for id in user_ids {
                if !record.members.contains(id) {
                    record.members.push(id.clone());
                    joined.push(id.clone());
                }
            }
        }
        let members = self.channels.get(url).map(|c| c.members.clone()).unwrap_or_default();
        for user_id in joined {
            let event =
                BackendEvent::MemberJoined { channel_url: url.to_owned(), user: self.user(&user_id) };
            self.notify(&members, None, &event);
        }
        Ok(())
    }

    pub(crate) fn list_messages(
        &mut self,
        client: u64,
        url: &str,
        query: MessageListQuery,
    ) -> Result<Vec<Message>, BackendError> {
        self.take_fault(SimOperation::ListMessages)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        let top_level = self
            .messages
            .get(url)
            .map(|ms| ms.iter().filter(|m| !m.is_reply()).cloned().collect())
            .unwrap_or_default();
        Ok(window(top_level, &query))
    }

    /// Validate the author and the parent of a new message.
    fn check_post(
        &self,
        client: u64,
        url: &str,
        parent_id: Option<MessageId>,
    ) -> Result<UserId, BackendError> {
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        if let Some(parent_id) = parent_id {
            let parent = self.find_message(url, parent_id)?;
            if parent.is_reply() {
                return Err(BackendError::Rejected {
                    reason: "replies must target a top-level message".into(),
                });
            }
        }
        Ok(me)
    }

    fn post(
        &mut self,
        client: u64,
        url: &str,
        sender: UserId,
        parent_id: Option<MessageId>,
        body: MessageBody,
    ) -> Message {
        let id = self.next_message_id;
        self.next_message_id += 1;
        let message = Message {
            id,
            channel_url: url.to_owned(),
            parent_id,
            sender: self.user(&sender),
            body,
            created_at: self.tick(),
            edited: false,
        };
        self.messages.entry(url.to_owned()).or_default().push(message.clone());

        let (members, exclude) = self.audience(url, client);
        self.notify(&members, exclude, &BackendEvent::MessageReceived(message.clone()));
        message
    }

    pub(crate) fn send_message(
        &mut self,
        client: u64,
        url: &str,
        params: MessageCreateParams,
    ) -> Result<Message, BackendError> {
        self.take_fault(SimOperation::SendMessage)?;
        let me = self.check_post(client, url, params.parent_id)?;
        if params.text.trim().is_empty() {
            return Err(BackendError::Rejected { reason: "empty message".into() });
        }
        Ok(self.post(client, url, me, params.parent_id, MessageBody::text(params.text)))
    }

    pub(crate) fn send_file(
        &mut self,
        client: u64,
        url: &str,
        params: FileMessageCreateParams,
    ) -> Result<Message, BackendError> {
        self.take_fault(SimOperation::SendFile)?;
        let me = self.check_post(client, url, params.parent_id)?;
        let file = params.file;
        if file.data.is_empty() {
            return Err(BackendError::Rejected { reason: "empty file".into() });
        }
        if file.data.len() > MAX_UPLOAD_BYTES {
            return Err(BackendError::Rejected {
                reason: format!("file exceeds {MAX_UPLOAD_BYTES} bytes"),
            });
        }
        let body = MessageBody::File {
            url: format!("https://files.sim.local/{url}/{}", file.name),
            size: file.data.len() as u64,
            name: file.name,
            mime_type: file.mime_type,
        };
        Ok(self.post(client, url, me, params.parent_id, body))
    }

    pub(crate) fn update_message(
        &mut self,
        client: u64,
        url: &str,
        message_id: MessageId,
        text: &str,
    ) -> Result<Message, BackendError> {
        self.take_fault(SimOperation::UpdateMessage)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        let message = self.find_message(url, message_id)?;
        if !message.sent_by(&me) {
            return Err(BackendError::Forbidden { reason: "only the sender can edit".into() });
        }
        if message.text().is_none() {
            return Err(BackendError::Rejected { reason: "file messages cannot be edited".into() });
        }
        if text.trim().is_empty() {
            return Err(BackendError::Rejected { reason: "empty message".into() });
        }

        let updated = self
            .messages
            .get_mut(url)
            .and_then(|ms| ms.iter_mut().find(|m| m.id == message_id))
            .map(|m| {
                m.body = MessageBody::text(text);
                m.edited = true;
                m.clone()
            })
            .ok_or_else(|| BackendError::NotFound { what: format!("message {message_id}") })?;

        let (members, exclude) = self.audience(url, client);
        self.notify(&members, exclude, &BackendEvent::MessageUpdated(updated.clone()));
        Ok(updated)
    }

    pub(crate) fn delete_message(
        &mut self,
        client: u64,
        url: &str,
        message_id: MessageId,
    ) -> Result<(), BackendError> {
        self.take_fault(SimOperation::DeleteMessage)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        if !self.find_message(url, message_id)?.sent_by(&me) {
            return Err(BackendError::Forbidden { reason: "only the sender can delete".into() });
        }

        // Replies go with their parent
        let mut deleted = Vec::new();
        if let Some(messages) = self.messages.get_mut(url) {
            messages.retain(|m| {
                let gone = m.id == message_id || m.parent_id == Some(message_id);
                if gone {
                    deleted.push(m.id);
                }
                !gone
            });
        }
        let members = self.channels.get(url).map(|c| c.members.clone()).unwrap_or_default();
        // Replies first, so no client ever holds a reply without its parent
        deleted.sort_by_key(|id| *id == message_id);
        for id in deleted {
            let event = BackendEvent::MessageDeleted { channel_url: url.to_owned(), message_id: id };
            self.notify(&members, None, &event);
        }
        Ok(())
    }

    pub(crate) fn get_message(
        &mut self,
        client: u64,
        url: &str,
        message_id: MessageId,
    ) -> Result<Message, BackendError> {
        self.take_fault(SimOperation::GetMessage)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        self.find_message(url, message_id).cloned()
    }

    pub(crate) fn list_thread_replies(
        &mut self,
        client: u64,
        url: &str,
        parent_id: MessageId,
        query: MessageListQuery,
    ) -> Result<Vec<Message>, BackendError> {
        self.take_fault(SimOperation::ListThreadReplies)?;
        let me = self.session_user(client)?;
        self.member_channel(url, &me)?;
        self.find_message(url, parent_id)?;
        let replies = self
            .messages
            .get(url)
            .map(|ms| ms.iter().filter(|m| m.parent_id == Some(parent_id)).cloned().collect())
            .unwrap_or_default();
        Ok(window(replies, &query))
    }

    pub(crate) fn subscribe(&mut self, client: u64) -> Result<Subscription, BackendError> {
        self.take_fault(SimOperation::Subscribe)?;
        self.session_user(client)?;
        let (tx, subscription) = Subscription::channel();
        self.clients.entry(client).or_default().subscribers.push(tx);
        Ok(subscription)
    }
}

/// Apply a [`MessageListQuery`] to candidate messages, oldest first.
pub(crate) fn window(mut candidates: Vec<Message>, query: &MessageListQuery) -> Vec<Message> {
    candidates.sort_by_key(|m| (m.created_at, m.id));
    let split = candidates.partition_point(|m| {
        if query.inclusive { m.created_at <= query.timestamp } else { m.created_at < query.timestamp }
    });
    let after = candidates.split_off(split);
    let skip = candidates.len().saturating_sub(query.prev_result_size);
    candidates.drain(..skip);
    candidates.extend(
        after.into_iter().filter(|m| m.created_at > query.timestamp).take(query.next_result_size),
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: MessageId, created_at: i64) -> Message {
        Message {
            id,
            channel_url: "c".into(),
            parent_id: None,
            sender: User::new("alice", "Alice"),
            body: MessageBody::text("m"),
            created_at,
            edited: false,
        }
    }

    fn ids(messages: &[Message]) -> Vec<MessageId> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn latest_window_takes_newest_page() {
        let messages: Vec<_> = (1..=5).map(|i| at(i, i as i64 * 10)).collect();
        assert_eq!(ids(&window(messages, &MessageListQuery::latest(3))), [3, 4, 5]);
    }

    #[test]
    fn around_window_is_symmetric() {
        let messages: Vec<_> = (1..=9).rev().map(|i| at(i, i as i64 * 10)).collect();
        let query = MessageListQuery::around(50, 2, 2);
        assert_eq!(ids(&window(messages, &query)), [4, 5, 6, 7]);
    }

    #[test]
    fn exclusive_window_skips_anchor() {
        let messages: Vec<_> = (1..=3).map(|i| at(i, i as i64 * 10)).collect();
        let query = MessageListQuery { inclusive: false, ..MessageListQuery::around(20, 5, 5) };
        assert_eq!(ids(&window(messages, &query)), [1, 3]);
    }

    #[test]
    fn faults_are_consumed_once() {
        let mut world = World::new(7);
        world.faults.push_back((
            SimOperation::SendMessage,
            BackendError::Transport("reset".into()),
        ));

        assert!(world.take_fault(SimOperation::Connect).is_ok());
        assert!(world.take_fault(SimOperation::SendMessage).is_err());
        assert!(world.take_fault(SimOperation::SendMessage).is_ok());
    }

    #[test]
    fn channel_urls_are_seeded() {
        let urls = |seed| {
            let mut world = World::new(seed);
            (0..3).map(|_| world.unique_channel_url()).collect::<Vec<_>>()
        };
        assert_eq!(urls(42), urls(42));
        assert_ne!(urls(42), urls(43));
    }
}
