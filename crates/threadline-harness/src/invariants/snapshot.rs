//! Client states gathered for checking.
//!
//! A [`ClientSnapshot`] holds the same `Arc<ClientState>` a renderer
//! receives from the controller's watch channel, so checks see exactly what
//! would be on screen and never race the controller.

use std::sync::Arc;

use threadline_app::ClientState;

/// Published states of every client in a test.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// One entry per client.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// No clients. Every check passes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Just one client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Several clients sharing a server.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }
}

/// One client's published state, labelled for violation messages.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Usually the user ID.
    pub name: String,
    /// State as published.
    pub state: Arc<ClientState>,
}

impl ClientSnapshot {
    /// Label `state` as `name`.
    pub fn new(name: impl Into<String>, state: Arc<ClientState>) -> Self {
        Self { name: name.into(), state }
    }
}
