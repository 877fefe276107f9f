//! Line-oriented shell.
//!
//! Reads commands, forwards them to a [`RuntimeHandle`] and redraws the view
//! whenever the runtime publishes a new snapshot. Simulated peers are driven
//! by their own [`Controller`]s against the same [`SimServer`].

use std::{
    collections::{BTreeMap, btree_map::Entry},
    io::Write,
};

use threadline_app::{
    ChatError, ControllerConfig, Controller, FileUpload, InputTarget, Runtime, RuntimeConfig,
    RuntimeHandle,
};
use threadline_harness::{SimBackend, SimServer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    ShellError,
    commands::{self, ShellCommand},
    render,
};

/// Shell startup options.
#[derive(Debug, Clone, Default)]
pub struct ShellConfig {
    /// Seed for the simulated server.
    pub seed: u64,
    /// Echo the user's own messages back as pushes.
    pub echo: bool,
    /// Simulated peers as `(user_id, nickname)`.
    pub peers: Vec<(String, String)>,
    /// Controller options for the user and every peer.
    pub controller: ControllerConfig,
    /// Runtime options for the user's session.
    pub runtime: RuntimeConfig,
}

/// Whether the shell keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// Stop.
    Quit,
}

enum Step {
    Line(Option<String>),
    Changed(bool),
}

/// Chat shell over an in-process simulated server.
pub struct Shell<W: Write> {
    server: SimServer,
    handle: RuntimeHandle,
    peer_names: BTreeMap<String, String>,
    peers: BTreeMap<String, Controller<SimBackend>>,
    controller_config: ControllerConfig,
    out: W,
}

impl<W: Write> Shell<W> {
    /// Start a simulated server and the user's runtime. Must be called
    /// within a tokio runtime.
    pub fn new(config: ShellConfig, out: W) -> Result<Self, ShellError> {
        let server = SimServer::new(config.seed);
        server.set_echo(config.echo);
        for (user_id, nickname) in &config.peers {
            server.register_user(user_id, nickname);
        }

        let controller = Controller::new(server.client(), config.controller.clone())?;
        let handle = Runtime::spawn(controller, &config.runtime);
        tracing::info!(seed = config.seed, peers = config.peers.len(), "shell started");

        Ok(Self {
            server,
            handle,
            peer_names: config.peers.into_iter().collect(),
            peers: BTreeMap::new(),
            controller_config: config.controller,
            out,
        })
    }

    /// Handle to the user's runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// The simulated server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Rendered output so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Read and execute lines until `/quit` or end of input.
    pub async fn run(&mut self, input: impl AsyncBufRead + Unpin) -> Result<(), ShellError> {
        let mut lines = input.lines();
        let mut snapshots = self.handle.watch();
        let initial = snapshots.borrow_and_update().clone();
        render::render(&initial, &mut self.out)?;

        loop {
            let step = tokio::select! {
                line = lines.next_line() => Step::Line(line?),
                changed = snapshots.changed() => Step::Changed(changed.is_ok()),
            };

            match step {
                Step::Line(None) | Step::Changed(false) => break,
                Step::Line(Some(line)) => match commands::parse(&line) {
                    Ok(None) => {},
                    Ok(Some(command)) => {
                        if self.execute(command).await? == Flow::Quit {
                            break;
                        }
                    },
                    Err(err) => writeln!(self.out, "{err}")?,
                },
                Step::Changed(true) => {
                    let state = snapshots.borrow_and_update().clone();
                    render::render(&state, &mut self.out)?;
                },
            }
        }

        if snapshots.has_changed().unwrap_or(false) {
            let state = snapshots.borrow_and_update().clone();
            render::render(&state, &mut self.out)?;
        }
        Ok(())
    }

    /// Execute one command.
    ///
    /// Failures of the user's session are already on the error line of the
    /// next snapshot; other failures are written out directly. Only I/O
    /// errors and a stopped runtime end the shell.
    pub async fn execute(&mut self, command: ShellCommand) -> Result<Flow, ShellError> {
        let result = self.dispatch(command).await;
        self.drain_peers().await;
        match result {
            Ok(flow) => Ok(flow),
            Err(ShellError::Chat(ChatError::RuntimeClosed)) => Err(ChatError::RuntimeClosed.into()),
            Err(ShellError::Io(err)) => Err(err.into()),
            Err(ShellError::Chat(err)) => {
                tracing::debug!(error = %err, "command failed");
                Ok(Flow::Continue)
            },
            Err(err) => {
                writeln!(self.out, "error: {err}")?;
                Ok(Flow::Continue)
            },
        }
    }

    /// A simulated peer's controller, once the peer has posted.
    pub fn peer(&self, user_id: &str) -> Option<&Controller<SimBackend>> {
        self.peers.get(user_id)
    }

    /// Disconnect the user and every peer.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.handle.shutdown().await {
            tracing::debug!(error = %err, "runtime already stopped");
        }
        for peer in self.peers.values_mut() {
            peer.disconnect().await;
        }
    }

    async fn dispatch(&mut self, command: ShellCommand) -> Result<Flow, ShellError> {
        let h = &self.handle;
        match command {
            ShellCommand::Connect { user_id, nickname } => {
                h.connect(user_id, nickname.unwrap_or_default()).await?;
            },
            ShellCommand::Users => {
                h.load_application_users().await?;
            },
            ShellCommand::Pick { user_id } => h.toggle_member(user_id).await?,
            ShellCommand::Create { name } => {
                let channel = h.create_channel_from_selection(name).await?;
                h.join_channel(channel.url).await?;
            },
            ShellCommand::Join { channel } => {
                let url = self.resolve_channel(&channel)?;
                self.handle.join_channel(url).await?;
            },
            ShellCommand::Leave => h.leave_channel().await?,
            ShellCommand::Delete => {
                let url = self.active_url()?;
                self.handle.delete_channel(url).await?;
            },
            ShellCommand::Invite => h.invite_selection().await?,
            ShellCommand::Edit { message_id, text } => {
                h.begin_edit(message_id).await?;
                if let Some(text) = text {
                    h.set_input(InputTarget::Message, text).await?;
                    h.submit_message_input().await?;
                }
            },
            ShellCommand::Cancel => h.cancel_edit().await?,
            ShellCommand::Remove { message_id } => h.delete_message(message_id).await?,
            ShellCommand::Thread { message_id } => {
                h.open_thread(message_id).await?;
            },
            ShellCommand::Close => h.close_thread().await?,
            ShellCommand::Reply { text } => {
                h.set_input(InputTarget::Thread, text).await?;
                h.submit_thread_input().await?;
            },
            ShellCommand::File { name, content } => {
                let url = self.active_url()?;
                let file = FileUpload {
                    mime_type: mime_type(&name).to_owned(),
                    name,
                    data: content.into_bytes(),
                };
                self.handle.send_attachment(url, file, None).await?;
            },
            ShellCommand::As { peer, text } => self.peer_say(&peer, &text).await?,
            ShellCommand::Dismiss => h.dismiss_error().await?,
            ShellCommand::Help => render::render_help(&mut self.out)?,
            ShellCommand::Quit => return Ok(Flow::Quit),
            ShellCommand::Say { text } => {
                h.set_input(InputTarget::Message, text).await?;
                h.submit_message_input().await?;
            },
        }
        Ok(Flow::Continue)
    }

    fn active_url(&self) -> Result<String, ShellError> {
        self.handle.snapshot().active_channel.clone().ok_or(ShellError::NoActiveChannel)
    }

    /// A 1-based position in the channel list, or a channel url.
    fn resolve_channel(&self, reference: &str) -> Result<String, ShellError> {
        let Ok(position) = reference.parse::<usize>() else {
            return Ok(reference.to_owned());
        };
        let state = self.handle.snapshot();
        position
            .checked_sub(1)
            .and_then(|i| state.channels.get(i))
            .map(|c| c.url.clone())
            .ok_or_else(|| ShellError::UnknownChannel(reference.to_owned()))
    }

    /// Post `text` to the active channel as a simulated peer, connecting the
    /// peer on first use.
    async fn peer_say(&mut self, peer: &str, text: &str) -> Result<(), ShellError> {
        let url = self.active_url()?;
        let Some(nickname) = self.peer_names.get(peer) else {
            return Err(ShellError::UnknownPeer(peer.to_owned()));
        };
        let fail = |source| ShellError::Peer { peer: peer.to_owned(), source };

        let controller = match self.peers.entry(peer.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut controller =
                    Controller::new(self.server.client(), self.controller_config.clone())
                        .map_err(fail)?;
                controller.connect(peer, nickname).await.map_err(fail)?;
                entry.insert(controller)
            },
        };

        if !controller.state().is_active(&url) {
            controller.join_channel(&url).await.map_err(fail)?;
        }
        controller.send_message(&url, text, None).await.map_err(fail)?;
        Ok(())
    }

    /// Apply pushes queued for every peer.
    async fn drain_peers(&mut self) {
        for (peer, controller) in &mut self.peers {
            let applied = controller.drain_events().await;
            if applied > 0 {
                tracing::trace!(peer = %peer, applied, "peer events applied");
            }
        }
    }
}

fn mime_type(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt" | "md") => "text/plain",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(mime_type("notes.TXT"), "text/plain");
        assert_eq!(mime_type("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type("archive"), "application/octet-stream");
    }
}
