//! Error types for the chat session controller.
//!
//! Two layers: [`BackendError`] is what a [`crate::ChatBackend`] reports for a
//! single request, [`ChatError`] is what a controller operation returns to its
//! caller. The mapping between them depends on the operation (a rejected
//! request is a [`ChatError::Send`] for `send_message` but a
//! [`ChatError::Edit`] for `edit_message`).

use thiserror::Error;

use crate::ConnectionState;

/// Failure reported by a chat backend request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Session could not be authenticated.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Backend-provided reason.
        reason: String,
    },

    /// Referenced channel, message or user does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// Caller lacks the rights for this request.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Backend-provided reason.
        reason: String,
    },

    /// Request was well-formed but refused (validation, quota, upload).
    #[error("rejected: {reason}")]
    Rejected {
        /// Backend-provided reason.
        reason: String,
    },

    /// Request did not reach the backend or the response was lost.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Controller operation, used to pick the [`ChatError`] variant for a backend
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `connect` and the user update that follows it.
    Connect,
    /// Loading the channel list.
    ListChannels,
    /// Loading the member selector.
    ListUsers,
    /// `create_channel`
    CreateChannel,
    /// `join_channel`
    JoinChannel,
    /// `delete_channel`
    DeleteChannel,
    /// `invite_members`
    InviteMembers,
    /// `send_message`
    SendMessage,
    /// `send_attachment`
    SendAttachment,
    /// `edit_message`
    EditMessage,
    /// `delete_message`
    DeleteMessage,
    /// `open_thread`
    OpenThread,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::ListChannels => "list channels",
            Self::ListUsers => "list users",
            Self::CreateChannel => "create channel",
            Self::JoinChannel => "join channel",
            Self::DeleteChannel => "delete channel",
            Self::InviteMembers => "invite members",
            Self::SendMessage => "send message",
            Self::SendAttachment => "send attachment",
            Self::EditMessage => "edit message",
            Self::DeleteMessage => "delete message",
            Self::OpenThread => "open thread",
        };
        f.write_str(name)
    }
}

/// Errors returned by controller operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Session setup failed.
    #[error("authentication failed: {reason}")]
    Auth {
        /// Failure description.
        reason: String,
    },

    /// Generic backend request failure.
    #[error("{operation} failed: {reason}")]
    Backend {
        /// Operation that failed.
        operation: Operation,
        /// Failure description.
        reason: String,
    },

    /// Channel or message is absent.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// Caller is not allowed to perform the operation.
    #[error("permission denied: {reason}")]
    Permission {
        /// Failure description.
        reason: String,
    },

    /// Sending a text message failed.
    #[error("failed to send message: {reason}")]
    Send {
        /// Failure description.
        reason: String,
    },

    /// Uploading a file message failed.
    #[error("failed to upload file: {reason}")]
    Upload {
        /// Failure description.
        reason: String,
    },

    /// Editing a message failed.
    #[error("failed to edit message: {reason}")]
    Edit {
        /// Failure description.
        reason: String,
    },

    /// Operation is not valid in the current state.
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// Operation that was attempted.
        operation: String,
        /// Connection state when the error occurred.
        state: ConnectionState,
    },

    /// Caller passed unusable arguments.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Failure description.
        reason: String,
    },

    /// The runtime task has stopped.
    #[error("runtime closed")]
    RuntimeClosed,
}

impl ChatError {
    /// Map a backend failure to the error the given operation reports.
    pub fn from_backend(operation: Operation, err: BackendError) -> Self {
        let reason = err.to_string();
        match (operation, err) {
            (Operation::Connect, _) => Self::Auth { reason },
            (Operation::SendMessage, _) => Self::Send { reason },
            (Operation::SendAttachment, _) => Self::Upload { reason },
            (Operation::EditMessage, _) => Self::Edit { reason },
            (_, BackendError::NotFound { what }) => Self::NotFound { what },
            (_, BackendError::Forbidden { reason }) => Self::Permission { reason },
            (operation, _) => Self::Backend { operation, reason },
        }
    }

    /// Shorthand for [`ChatError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_failures_keep_their_own_category() {
        let err = BackendError::Forbidden { reason: "not the sender".into() };

        assert!(matches!(
            ChatError::from_backend(Operation::EditMessage, err.clone()),
            ChatError::Edit { .. }
        ));
        assert!(matches!(
            ChatError::from_backend(Operation::SendMessage, err.clone()),
            ChatError::Send { .. }
        ));
        assert!(matches!(
            ChatError::from_backend(Operation::SendAttachment, err),
            ChatError::Upload { .. }
        ));
    }

    #[test]
    fn connect_failures_are_auth_errors() {
        let err = BackendError::Transport("connection reset".into());
        assert!(matches!(ChatError::from_backend(Operation::Connect, err), ChatError::Auth { .. }));
    }

    #[test]
    fn not_found_and_forbidden_map_to_dedicated_variants() {
        let missing = BackendError::NotFound { what: "channel c1".into() };
        assert_eq!(
            ChatError::from_backend(Operation::JoinChannel, missing),
            ChatError::NotFound { what: "channel c1".into() }
        );

        let forbidden = BackendError::Forbidden { reason: "operators only".into() };
        assert!(matches!(
            ChatError::from_backend(Operation::DeleteChannel, forbidden),
            ChatError::Permission { .. }
        ));

        let rejected = BackendError::Rejected { reason: "quota".into() };
        assert!(matches!(
            ChatError::from_backend(Operation::InviteMembers, rejected),
            ChatError::Backend { operation: Operation::InviteMembers, .. }
        ));
    }
}
