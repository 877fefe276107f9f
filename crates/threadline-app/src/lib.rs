//! Application layer for Threadline
//!
//! Client-side session and thread state machine for a group chat with threaded
//! replies. A pure state machine owns the snapshot; an async controller drives
//! any chat backend behind the [`ChatBackend`] trait, so the same code runs
//! against a hosted service and the deterministic simulation.
//!
//! # Components
//!
//! - [`App`]: Pure state machine (placement rule, channel cache, inputs)
//! - [`ChatBackend`]: Trait abstracting the chat service
//! - [`Controller`]: Session operations and push handling over a backend
//! - [`Runtime`]: Actor serializing commands and pushes on one task

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod app;
mod backend;
mod command;
mod config;
mod controller;
mod error;
mod event;
mod format;
mod runtime;
mod state;

pub use app::App;
pub use backend::{
    BackendEvent, ChannelCreateParams, ChannelListQuery, ChatBackend, FileMessageCreateParams,
    FileUpload, MessageCreateParams, MessageListQuery, Subscription, UserUpdate,
};
pub use config::{ControllerConfig, RuntimeConfig};
pub use controller::Controller;
pub use error::{BackendError, ChatError, Operation};
pub use event::AppEvent;
pub use format::{channel_display_name, format_timestamp, profile_initial};
pub use runtime::{Runtime, RuntimeHandle};
pub use state::{
    Channel, ChannelUrl, ClientState, ConnectionState, InputBuffers, InputTarget, Message,
    MessageBody, MessageId, Session, ThreadView, User, UserId,
};
