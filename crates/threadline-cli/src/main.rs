//! Threadline shell binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect as alice with two simulated peers
//! threadline --user alice --nickname Alice --peer bob:Bob --peer carol
//!
//! # Verbose logging to stderr
//! RUST_LOG=threadline_app=debug threadline --user alice
//! ```

use clap::Parser;
use threadline_app::{ControllerConfig, RuntimeConfig};
use threadline_cli::{Shell, ShellCommand, ShellConfig};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Threadline chat shell
#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(about = "Group chat with threads against a simulated backend")]
#[command(version)]
struct Args {
    /// Connect as this user on startup
    #[arg(short, long)]
    user: Option<String>,

    /// Display name for --user (defaults to the user ID)
    #[arg(short, long)]
    nickname: Option<String>,

    /// Simulated peer as ID or ID:NICKNAME (repeatable)
    #[arg(short, long = "peer", value_parser = parse_peer)]
    peers: Vec<(String, String)>,

    /// Seed for the simulated server
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Echo your own messages back as pushes
    #[arg(long)]
    echo: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Messages loaded when joining a channel
    #[arg(long, default_value = "20")]
    message_page_size: usize,

    /// Replies loaded on each side of a thread's parent
    #[arg(long, default_value = "10")]
    thread_window: usize,

    /// Command mailbox capacity of the runtime
    #[arg(long, default_value = "64")]
    mailbox_capacity: usize,
}

fn parse_peer(value: &str) -> Result<(String, String), String> {
    let (id, nickname) = value.split_once(':').unwrap_or((value, value));
    if id.trim().is_empty() {
        return Err("peer id must not be empty".to_owned());
    }
    Ok((id.trim().to_owned(), nickname.trim().to_owned()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let config = ShellConfig {
        seed: args.seed,
        echo: args.echo,
        peers: args.peers,
        controller: ControllerConfig {
            message_page_size: args.message_page_size,
            thread_prev_size: args.thread_window,
            thread_next_size: args.thread_window,
            ..ControllerConfig::default()
        },
        runtime: RuntimeConfig { mailbox_capacity: args.mailbox_capacity },
    };

    let mut shell = Shell::new(config, std::io::stdout())?;
    if let Some(user_id) = args.user {
        shell.execute(ShellCommand::Connect { user_id, nickname: args.nickname }).await?;
    }

    let result = shell.run(BufReader::new(tokio::io::stdin())).await;
    shell.shutdown().await;
    Ok(result?)
}
