//! RouteMix console driver.
//!
//! Drives the engine from stdin: a line starting with `!` is a button-press
//! token (as printed next to each button), anything else is a free-text
//! message. Replies print to stdout and generated documents are written to
//! the working directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use routemix_bot::{ChatId, Engine, EngineConfig, HttpFetch, Keyboard, Reply};
use routemix_storage::GroupStore;

/// RouteMix - subscription feeds in, routing configurations out
#[derive(Parser, Debug)]
#[command(name = "routemix", version, about)]
struct Args {
    /// Path of the persisted rule-set group store
    #[arg(long, default_value = "groups.json")]
    groups: PathBuf,

    /// API token for the hosted snippet and catalog fetches
    #[arg(long, env = "ROUTEMIX_TOKEN")]
    token: Option<String>,

    /// Idle lifetime of a selection session, in seconds
    #[arg(long, default_value_t = 3600)]
    session_ttl: u64,

    /// Log filter (e.g. "routemix=debug")
    #[arg(long, default_value = "routemix=info,warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log)),
        )
        .init();

    let fetcher = HttpFetch::new(args.token.clone()).context("failed to build HTTP client")?;
    let groups = GroupStore::open(&args.groups);
    let config = EngineConfig {
        session_ttl: Duration::from_secs(args.session_ttl),
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(fetcher, groups, config));
    engine.load_catalog().await;

    // Externally driven sweep for abandoned sessions.
    let reaper = Arc::clone(&engine);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let evicted = reaper.evict_idle_sessions();
            if evicted > 0 {
                info!(evicted, "reaped idle sessions");
            }
        }
    });

    info!("console ready; `!TOKEN` presses a button, anything else is a message");

    let me = ChatId(0);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let replies = match line.strip_prefix('!') {
            Some(token) => engine.handle_action(me, token).await,
            None => engine.handle_text(me, line).await,
        };
        for reply in replies {
            render(&reply)?;
        }
    }
    Ok(())
}

fn render(reply: &Reply) -> anyhow::Result<()> {
    match reply {
        Reply::Message { text, keyboard } => {
            println!("{text}");
            if let Some(keyboard) = keyboard {
                print_keyboard(keyboard);
            }
        }
        Reply::UpdateKeyboard(Some(keyboard)) => print_keyboard(keyboard),
        Reply::UpdateKeyboard(None) => {}
        Reply::Notice(text) => println!("[{text}]"),
        Reply::Document {
            filename,
            content,
            caption,
        } => {
            std::fs::write(filename, content)
                .with_context(|| format!("failed to write {filename}"))?;
            println!("{caption} -> {filename}");
        }
    }
    Ok(())
}

fn print_keyboard(keyboard: &Keyboard) {
    for row in &keyboard.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|button| format!("[{} !{}]", button.label, button.action))
            .collect();
        println!("  {}", cells.join(" "));
    }
}
