//! Threadline command shell.
//!
//! A thin text front end over [`threadline_app::Runtime`]: lines are parsed
//! into [`ShellCommand`]s, forwarded to the runtime, and every published
//! snapshot is redrawn as plain text. The backend is an in-process
//! [`threadline_harness::SimServer`] with optional simulated peers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod error;
pub mod render;
pub mod shell;

pub use commands::{ParseError, ShellCommand};
pub use error::ShellError;
pub use shell::{Flow, Shell, ShellConfig};
