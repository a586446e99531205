//! Terminal chat client for the whatsmini backend.
//!
//! Reads commands from stdin:
//!
//!   /register <user> <password>
//!   /login <user> <password>
//!   /logout
//!   /key <user>
//!   /upload <to> <path>
//!   /history
//!   @<user> <text>
//!   /quit

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whatsmini_core::{ClientConfig, EventStore, OutputSink, SessionStore, WidgetEvent};
use whatsmini_session::{
    ManagerError, SessionManager,
    storage::{FileSessionStore, MemorySessionStore},
};

#[derive(Debug, Parser)]
#[command(name = "whatsmini-chat", about = "Chat over a whatsmini backend from the terminal")]
struct Args {
    /// Config file (defaults to ./whatsmini.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the session in memory only
    #[arg(long)]
    ephemeral: bool,
}

fn render(event: &WidgetEvent) {
    if event.is_own() {
        println!("{:>4}{event}", "");
    } else {
        println!("{event}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::load(args.config.as_deref())?;
    tracing::info!(api_base = config.api_base(), ws_base = %config.ws_base(), "starting");

    let events = Arc::new(EventStore::new());
    let mut lines = events.replay_and_follow();
    let printer = tokio::spawn(async move {
        while let Some(event) = lines.next().await {
            render(&event);
        }
    });

    let sink: Arc<dyn OutputSink> = Arc::clone(&events) as Arc<dyn OutputSink>;
    let result = if args.ephemeral {
        run(SessionManager::new(MemorySessionStore::new(), &config, sink), &events).await
    } else {
        match FileSessionStore::from_config(&config) {
            Ok(store) => {
                tracing::info!(path = %store.path().display(), "session file");
                run(SessionManager::new(store, &config, sink), &events).await
            }
            Err(e) => {
                tracing::warn!("falling back to in-memory session: {e}");
                run(SessionManager::new(MemorySessionStore::new(), &config, sink), &events).await
            }
        }
    };

    printer.abort();
    result
}

async fn run<S: SessionStore>(manager: SessionManager<S>, events: &EventStore) -> anyhow::Result<()> {
    if !manager.restore().await {
        events.emit(WidgetEvent::Notice("Not logged in. Use /register or /login.".to_string()));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = dispatch(&manager, events, line).await {
            report_failure(events, &e);
        }
    }

    manager.channel().close().await;
    Ok(())
}

/// The manager reports its own failures to the sink; anything else is shown here.
fn report_failure(events: &EventStore, e: &anyhow::Error) {
    if e.downcast_ref::<ManagerError>().is_some() {
        tracing::debug!("command failed: {e:#}");
    } else {
        events.emit(WidgetEvent::Notice(format!("{e:#}")));
    }
}

async fn dispatch<S: SessionStore>(manager: &SessionManager<S>, events: &EventStore, line: &str) -> anyhow::Result<()> {
    if let Some(rest) = line.strip_prefix('@') {
        let (to, text) = rest.split_once(' ').unwrap_or((rest, ""));
        manager.send(to, text)?;
        return Ok(());
    }

    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("/register"), Some(user), Some(password)) => manager.register(user, password).await?,
        (Some("/login"), Some(user), Some(password)) => {
            manager.login(user, password).await?;
        }
        (Some("/logout"), None, None) => {
            manager.logout().await;
            events.clear();
        }
        (Some("/key"), Some(user), None) => {
            manager.check_key(user).await?;
        }
        (Some("/upload"), Some(to), Some(path)) => {
            let path = PathBuf::from(path);
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            manager.upload_and_share(to, &file_name, bytes).await?;
        }
        (Some("/history"), None, None) => {
            for event in events.transcript() {
                render(&event);
            }
        }
        _ => events.emit(WidgetEvent::Notice(format!("Unknown command: {line}"))),
    }
    Ok(())
}
