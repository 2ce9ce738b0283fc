//! roomchat - Terminal client for the RoomLink chat engine
//!
//! Connects as a given user, lists conversations, opens one, and sends
//! messages, with live delivery printed as it arrives.

use anyhow::Result;
use clap::Parser;
use roomlink_chat::engine::ChatEngine;
use roomlink_chat::events::EngineEvent;
use roomlink_chat::{Config, SessionIdentity, UserRole};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "roomchat")]
#[command(about = "Terminal client for RoomLink chat")]
struct Cli {
    /// User id to connect as
    #[arg(long, env = "ROOMLINK_USER_ID")]
    user: String,

    /// Display name (defaults to the user id)
    #[arg(long)]
    name: Option<String>,

    /// REST base URL (overrides config and environment)
    #[arg(long)]
    api_url: Option<String>,

    /// WebSocket endpoint (overrides config and environment)
    #[arg(long)]
    socket_url: Option<String>,

    /// Path to a YAML config file (default: roomlink.yaml, then
    /// the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,roomlink_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().or_else(default_config_path);
    let mut config = Config::from_yaml_and_env(config_path.as_deref());
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(url) = cli.socket_url {
        config.socket_url = url;
    }

    let display_name = cli.name.as_deref().unwrap_or(&cli.user);
    let identity = SessionIdentity::new(&cli.user, display_name, UserRole::Student);

    let engine = ChatEngine::from_config(&config, identity);
    let mut events = engine.subscribe();
    engine.start().await?;

    println!("connected as {}", cli.user);
    println!("commands: /list, /open <user>, /quit; anything else sends to the open conversation");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&engine, line.trim()).await {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => render_event(&engine, &event),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    if std::path::Path::new("roomlink.yaml").exists() {
        return Some(PathBuf::from("roomlink.yaml"));
    }
    dirs::config_dir().map(|dir| dir.join("roomlink").join("config.yaml"))
}

/// Returns false when the user asked to quit.
async fn handle_line(engine: &ChatEngine, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    if line == "/quit" {
        return false;
    }
    if line == "/list" {
        for entry in engine.directory_snapshot().await {
            let unread = if entry.unread_count > 0 {
                format!(" ({} unread)", entry.unread_count)
            } else {
                String::new()
            };
            println!(
                "  {} [{}]{}: {}",
                entry.display_name, entry.counterpart_id, unread, entry.last_message
            );
        }
        return true;
    }
    // match on the whole first token, so "/openu2" is not an open command
    let mut tokens = line.split_whitespace();
    if tokens.next() == Some("/open") {
        let Some(target) = tokens.next() else {
            println!("usage: /open <user>");
            return true;
        };
        match engine.open_conversation(target).await {
            Ok(()) => {
                for message in engine.conversation_snapshot().await {
                    print_message(engine, &message);
                }
            }
            Err(e) => eprintln!("could not load conversation: {e}"),
        }
        return true;
    }
    if line.starts_with('/') {
        println!("unknown command: {line}");
        return true;
    }

    // plain text sends to the open conversation
    let Some(counterpart) = engine.active_counterpart().await else {
        println!("open a conversation first (/open <user>)");
        return true;
    };
    if let Err(e) = engine.send_message(&counterpart, line).await {
        eprintln!("not sent: {e}");
    }
    true
}

fn render_event(engine: &ChatEngine, event: &EngineEvent) {
    match event {
        EngineEvent::MessageReceived { message } if !engine.is_mine(message) => {
            print_message(engine, message);
        }
        EngineEvent::ConnectionChanged { connected } => {
            if *connected {
                println!("(connected)");
            } else {
                println!("(connection lost, retrying)");
            }
        }
        EngineEvent::ReadReceipt { user_id } => {
            println!("({user_id} read your messages)");
        }
        EngineEvent::Notification { payload } => {
            println!("(notification) {payload}");
        }
        _ => {}
    }
}

fn print_message(engine: &ChatEngine, message: &roomlink_chat::Message) {
    let who = if engine.is_mine(message) {
        "me"
    } else {
        message.sender_id.as_str()
    };
    println!("[{who}] {}", message.message);
}
