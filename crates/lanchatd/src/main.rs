//! lanchatd — line-oriented LAN chat host.
//!
//! Reads commands from stdin:
//!
//! ```text
//! <address> <text>   send a message
//! /discover          broadcast a hello now
//! /peers             list known peers
//! /quit              stop and exit (Ctrl-C works too)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use lanchat_core::config::ChatConfig;
use lanchat_services::{ChatEvent, EventReceiver};
use lanchatd::ChatManager;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = ChatConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ChatConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ChatConfig::default()
    });

    let known = config.peers.known.clone();
    let manager = Arc::new(ChatManager::new(config));
    let events = manager.subscribe();

    for address in known {
        manager.restore_peer(address);
    }
    tracing::info!(count = manager.peers().len(), "known peers restored");

    let printer = tokio::spawn(print_events(events));

    manager.start().await.context("failed to start chat")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if !handle_command(&manager, line.trim()).await {
                    break;
                }
            }
        }
    }

    manager.stop().await;
    drop(manager);
    let _ = printer.await;
    Ok(())
}

/// Run one command. `false` means exit.
async fn handle_command(manager: &ChatManager, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/discover" => {
            if let Err(e) = manager.discover().await {
                eprintln!("discovery failed: {e}");
            }
        }
        "/peers" => {
            for peer in manager.peers() {
                let seen = peer
                    .last_online
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<15}  {:<7}  last seen {seen}",
                    peer.address,
                    if peer.is_online { "online" } else { "offline" },
                );
            }
        }
        _ => {
            let (target, text) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            if let Err(e) = manager.send(target, text).await {
                eprintln!("send failed: {e}");
            }
        }
    }
    true
}

/// Print host-facing events until the manager goes away.
async fn print_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::MessageReceived { message, sender } => {
                println!(
                    "[{}] {sender}: {}",
                    message.timestamp_utc.format("%H:%M:%S"),
                    message.content
                );
            }
            ChatEvent::MessageSent { message, target } => {
                println!(
                    "[{}] -> {target}: {}",
                    message.timestamp_utc.format("%H:%M:%S"),
                    message.content
                );
            }
            ChatEvent::PeerUpdated(peer) => {
                tracing::info!(
                    peer = %peer.address,
                    online = peer.is_online,
                    known = peer.is_known,
                    "peer updated"
                );
            }
            ChatEvent::StatusChanged(text) => {
                tracing::debug!(status = %text, "status");
            }
        }
    }
}
