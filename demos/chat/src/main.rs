//! Chat Room Demo
//!
//! A tiny chat room wired entirely through a tidings dispatcher. Every kind
//! of event is its own type, and handlers pick what they see purely by the
//! type of their single argument:
//!
//! ```text
//! stdin line ─┬─ "/join ann"  ─▶ Join    ─▶ member list, one-shot greeter
//!             ├─ "/leave ann" ─▶ Leave   ─▶ member list
//!             └─ "ann: hi"    ─▶ Message ─▶ log_message, moderate, crash_on_command
//! ```
//!
//! Failing handlers (an `Err` from `moderate`, a panic from
//! `crash_on_command`) never stop the room; their failures show up on the
//! dispatcher's error channel and are logged by `report_errors`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package chat-demo
//! cargo run --package chat-demo -- --scripted
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use clap::Parser;
use tidings::core::ErrorReceiver;
use tidings::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

// ============================================================================
// Event Types
// ============================================================================

/// Someone entered the room.
#[derive(Debug, Clone)]
struct Join {
    user: String,
}

/// Someone left the room.
#[derive(Debug, Clone)]
struct Leave {
    user: String,
}

/// A chat line.
#[derive(Debug, Clone)]
struct Message {
    user: String,
    text: String,
}

type Members = Arc<Mutex<BTreeSet<String>>>;

// ============================================================================
// Handler Functions
// ============================================================================

/// Logs every chat line.
async fn log_message(msg: Message) {
    info!("[{}] {}", msg.user, msg.text);
}

/// Rejects shouting. The `Err` is delivered on the error channel.
async fn moderate(msg: Message) -> Result<(), String> {
    let letters: Vec<char> = msg.text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() >= 5 && letters.iter().all(|c| c.is_uppercase()) {
        return Err(format!("{} is shouting", msg.user));
    }
    Ok(())
}

/// Panics on `/crash` to show that a failing handler does not take the room down.
async fn crash_on_command(msg: Message) {
    if msg.text.trim() == "/crash" {
        panic!("{} asked for a crash", msg.user);
    }
}

/// Logs handler failures. Ends once the dispatcher has shut down.
async fn report_errors(mut errors: ErrorReceiver) {
    while let Some(record) = errors.recv().await {
        warn!(
            handler = %record.handler(),
            value_type = %record.value_type(),
            "Handler failed: {}",
            record.failure()
        );
    }
}

// ============================================================================
// Room Wiring
// ============================================================================

fn register_room(dispatcher: &Dispatcher, members: &Members) -> Result<()> {
    dispatcher.subscribe(log_message)?;
    dispatcher.subscribe(moderate)?;
    dispatcher.subscribe(crash_on_command)?;

    let joined = Arc::clone(members);
    dispatcher.subscribe(move |join: Join| {
        let members = Arc::clone(&joined);
        async move {
            let mut members = members.lock().await;
            if members.insert(join.user.clone()) {
                info!(user = %join.user, online = members.len(), "joined");
            }
        }
    })?;

    let left = Arc::clone(members);
    dispatcher.subscribe(move |leave: Leave| {
        let members = Arc::clone(&left);
        async move {
            let mut members = members.lock().await;
            if members.remove(&leave.user) {
                info!(user = %leave.user, online = members.len(), "left");
            }
        }
    })?;

    // One-shot: unsubscribes itself on its first invocation.
    let weak = dispatcher.downgrade();
    let slot: Arc<OnceLock<HandlerId>> = Arc::new(OnceLock::new());
    let greeter = {
        let slot = Arc::clone(&slot);
        move |join: Join| {
            let weak = weak.clone();
            let slot = Arc::clone(&slot);
            async move {
                if let (Some(dispatcher), Some(id)) = (weak.upgrade(), slot.get()) {
                    dispatcher.unsubscribe_id(*id);
                }
                info!("{} opened the room", join.user);
            }
        }
    };
    let id = dispatcher.subscribe(greeter)?;
    let _ = slot.set(id);

    Ok(())
}

/// Turns one input line into an event and publishes it.
async fn publish_line(dispatcher: &Dispatcher, line: &str) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    if let Some(user) = line.strip_prefix("/join ") {
        dispatcher
            .publish(Join {
                user: user.trim().to_string(),
            })
            .await?;
    } else if let Some(user) = line.strip_prefix("/leave ") {
        dispatcher
            .publish(Leave {
                user: user.trim().to_string(),
            })
            .await?;
    } else {
        let (user, text) = line.split_once(':').unwrap_or(("anonymous", line));
        dispatcher
            .publish(Message {
                user: user.trim().to_string(),
                text: text.trim().to_string(),
            })
            .await?;
    }
    Ok(())
}

async fn read_stdin(dispatcher: Dispatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        publish_line(&dispatcher, &line).await?;
    }
    Ok(())
}

async fn run_script(dispatcher: Dispatcher) -> Result<()> {
    const SCRIPT: &[&str] = &[
        "/join ann",
        "/join bob",
        "ann: hello bob",
        "bob: HELLO ANN",
        "bob: /crash",
        "ann: still here?",
        "/leave bob",
    ];
    for line in SCRIPT {
        publish_line(&dispatcher, line).await?;
    }
    // Values with no subscriber are accepted and dropped.
    dispatcher.publish(42_u64).await?;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "chat-demo", about = "A chat room built on the tidings dispatcher")]
struct Args {
    /// Configuration file to load instead of searching for tidings.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (development, production, ...).
    #[arg(short, long)]
    profile: Option<String>,

    /// Play a canned conversation instead of reading stdin.
    #[arg(long)]
    scripted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = Runtime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;
    let dispatcher = runtime.dispatcher().clone();

    let members: Members = Arc::default();
    register_room(&dispatcher, &members)?;

    let reporter = dispatcher.errors().map(|errors| tokio::spawn(report_errors(errors)));

    let input = async {
        let outcome = if args.scripted {
            run_script(dispatcher.clone()).await
        } else {
            tokio::select! {
                outcome = read_stdin(dispatcher.clone()) => outcome,
                signal = tokio::signal::ctrl_c() => signal.map_err(Into::into),
            }
        };
        if let Err(e) = outcome {
            error!("Input stopped: {e:#}");
        }
    };
    runtime.run_until(input).await;

    if let Some(reporter) = reporter {
        reporter.await?;
    }

    let online = members.lock().await;
    info!(online = ?*online, "Room closed");
    Ok(())
}
