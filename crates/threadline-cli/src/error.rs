//! Shell errors.

use std::io;

use thiserror::Error;
use threadline_app::ChatError;

/// Errors raised while running the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation of the shell's own session failed.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Operation of a simulated peer failed.
    #[error("peer {peer}: {source}")]
    Peer {
        /// Peer user ID.
        peer: String,
        /// Underlying failure.
        source: ChatError,
    },

    /// Peer was not registered on the command line.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Channel reference matches no cached channel.
    #[error("no channel {0}")]
    UnknownChannel(String),

    /// Command needs an active channel.
    #[error("no active channel")]
    NoActiveChannel,
}
