//! Shell command parsing.
//!
//! Lines starting with `/` are commands, anything else is message text for
//! the channel input.

use thiserror::Error;
use threadline_app::MessageId;

/// Usage line and description of every command, in `/help` order.
pub const HELP: &[(&str, &str)] = &[
    ("/connect USER [NICKNAME]", "open a session"),
    ("/users", "load users for the member picker"),
    ("/pick USER", "toggle a user in the member picker"),
    ("/create [NAME]", "create a channel with the picked users"),
    ("/join CHANNEL", "show a channel (list number or url)"),
    ("/leave", "stop showing the active channel"),
    ("/delete", "delete the active channel"),
    ("/invite", "invite the picked users to the active channel"),
    ("/edit ID [TEXT]", "edit one of your messages"),
    ("/cancel", "stop editing"),
    ("/rm ID", "delete one of your messages"),
    ("/thread ID", "open the thread of a message"),
    ("/close", "close the thread"),
    ("/reply TEXT", "reply in the open thread"),
    ("/file NAME [CONTENT]", "upload a file to the active channel"),
    ("/as PEER TEXT", "post to the active channel as a simulated peer"),
    ("/dismiss", "clear the error line"),
    ("/help", "show this help"),
    ("/quit", "exit"),
];

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Open a session.
    Connect {
        /// User to connect as.
        user_id: String,
        /// Display name. Defaults to the user ID.
        nickname: Option<String>,
    },
    /// Load the member picker.
    Users,
    /// Toggle a user in the member picker.
    Pick {
        /// User to toggle.
        user_id: String,
    },
    /// Create a channel from the picked users.
    Create {
        /// Channel name, possibly empty.
        name: String,
    },
    /// Show a channel.
    Join {
        /// 1-based position in the channel list, or a channel url.
        channel: String,
    },
    /// Stop showing the active channel.
    Leave,
    /// Delete the active channel.
    Delete,
    /// Invite the picked users to the active channel.
    Invite,
    /// Start editing a message, optionally submitting new text right away.
    Edit {
        /// Message to edit.
        message_id: MessageId,
        /// Replacement text.
        text: Option<String>,
    },
    /// Stop editing.
    Cancel,
    /// Delete a message.
    Remove {
        /// Message to delete.
        message_id: MessageId,
    },
    /// Open a thread.
    Thread {
        /// Parent message.
        message_id: MessageId,
    },
    /// Close the thread.
    Close,
    /// Reply in the open thread.
    Reply {
        /// Reply text.
        text: String,
    },
    /// Upload a file built from the given content.
    File {
        /// File name.
        name: String,
        /// File content.
        content: String,
    },
    /// Post as a simulated peer.
    As {
        /// Peer user ID.
        peer: String,
        /// Message text.
        text: String,
    },
    /// Clear the error line.
    Dismiss,
    /// Show help.
    Help,
    /// Exit the shell.
    Quit,
    /// Submit text through the channel input.
    Say {
        /// Message text.
        text: String,
    },
}

/// Shell line that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Command name not recognized.
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),

    /// Command is missing a required argument.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Message ID is not a number.
    #[error("invalid message id: {0}")]
    InvalidId(String),
}

/// Parse one shell line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ShellCommand>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(ShellCommand::Say { text: line.to_owned() }));
    };

    let (name, rest) = split_word(body);
    let command = match name {
        "connect" => {
            let (user_id, nickname) = split_word(rest);
            ShellCommand::Connect {
                user_id: required(user_id, "/connect USER [NICKNAME]")?,
                nickname: optional(nickname),
            }
        },
        "users" => ShellCommand::Users,
        "pick" => ShellCommand::Pick { user_id: required(rest, "/pick USER")? },
        "create" => ShellCommand::Create { name: rest.to_owned() },
        "join" => ShellCommand::Join { channel: required(rest, "/join CHANNEL")? },
        "leave" => ShellCommand::Leave,
        "delete" => ShellCommand::Delete,
        "invite" => ShellCommand::Invite,
        "edit" => {
            let (id, text) = split_word(rest);
            ShellCommand::Edit { message_id: message_id(id, "/edit ID [TEXT]")?, text: optional(text) }
        },
        "cancel" => ShellCommand::Cancel,
        "rm" => ShellCommand::Remove { message_id: message_id(rest, "/rm ID")? },
        "thread" => ShellCommand::Thread { message_id: message_id(rest, "/thread ID")? },
        "close" => ShellCommand::Close,
        "reply" => ShellCommand::Reply { text: required(rest, "/reply TEXT")? },
        "file" => {
            let (name, content) = split_word(rest);
            ShellCommand::File {
                name: required(name, "/file NAME [CONTENT]")?,
                content: content.to_owned(),
            }
        },
        "as" => {
            let (peer, text) = split_word(rest);
            let usage = "/as PEER TEXT";
            ShellCommand::As { peer: required(peer, usage)?, text: required(text, usage)? }
        },
        "dismiss" => ShellCommand::Dismiss,
        "help" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required(value: &str, usage: &'static str) -> Result<String, ParseError> {
    if value.is_empty() { Err(ParseError::Usage(usage)) } else { Ok(value.to_owned()) }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

fn message_id(value: &str, usage: &'static str) -> Result<MessageId, ParseError> {
    let value = required(value, usage)?;
    value.trim_start_matches('#').parse().map_err(|_| ParseError::InvalidId(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> ShellCommand {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn plain_text_is_said() {
        assert_eq!(cmd("  hello there "), ShellCommand::Say { text: "hello there".into() });
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn connect_takes_optional_nickname() {
        assert_eq!(
            cmd("/connect alice"),
            ShellCommand::Connect { user_id: "alice".into(), nickname: None }
        );
        assert_eq!(
            cmd("/connect alice Alice Liddell"),
            ShellCommand::Connect { user_id: "alice".into(), nickname: Some("Alice Liddell".into()) }
        );
        assert_eq!(parse("/connect"), Err(ParseError::Usage("/connect USER [NICKNAME]")));
    }

    #[test]
    fn message_ids_accept_hash_prefix() {
        assert_eq!(cmd("/thread #12"), ShellCommand::Thread { message_id: 12 });
        assert_eq!(cmd("/rm 3"), ShellCommand::Remove { message_id: 3 });
        assert_eq!(
            cmd("/edit 4 new text"),
            ShellCommand::Edit { message_id: 4, text: Some("new text".into()) }
        );
        assert_eq!(parse("/rm abc"), Err(ParseError::InvalidId("abc".into())));
    }

    #[test]
    fn create_name_may_be_empty() {
        assert_eq!(cmd("/create"), ShellCommand::Create { name: String::new() });
        assert_eq!(cmd("/create book club"), ShellCommand::Create { name: "book club".into() });
    }

    #[test]
    fn file_and_peer_commands_split_first_word() {
        assert_eq!(
            cmd("/file notes.txt some content"),
            ShellCommand::File { name: "notes.txt".into(), content: "some content".into() }
        );
        assert_eq!(
            cmd("/as bob hi alice"),
            ShellCommand::As { peer: "bob".into(), text: "hi alice".into() }
        );
        assert_eq!(parse("/as bob"), Err(ParseError::Usage("/as PEER TEXT")));
    }

    #[test]
    fn unknown_command_is_reported() {
        let err = parse("/frobnicate now").unwrap_err();
        assert_eq!(err.to_string(), "unknown command: /frobnicate (try /help)");
    }

    #[test]
    fn every_command_in_help_parses() {
        for (usage, _) in HELP {
            let line: String = usage
                .split_whitespace()
                .map(|word| match word {
                    "ID" | "[ID]" => "1",
                    w if w.chars().all(|c| c.is_ascii_uppercase() || "[]".contains(c)) => "x",
                    w => w,
                })
                .collect::<Vec<_>>()
                .join(" ");
            assert!(parse(&line).is_ok(), "{line} did not parse");
        }
    }
}
