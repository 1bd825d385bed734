//! lanchat integration test harness.
//!
//! Runs whole chat managers against each other over loopback. Each "host"
//! binds its own 127.0.0.x address with the same ports, and aims its presence
//! broadcast straight at the other host, so the full discovery and messaging
//! exchange happens without a real broadcast domain.
//!
//! Linux routes all of 127.0.0.0/8 to lo out of the box. Elsewhere the extra
//! aliases may be missing, and the two-host tests skip themselves.
//!
//!   cargo test --test integration

use std::net::{Ipv4Addr, TcpListener, UdpSocket};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;

use lanchat_core::config::ChatConfig;
use lanchat_services::{ChatEvent, EventReceiver};

mod discovery;
mod lifecycle;
mod messaging;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const HOST_A: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
pub const HOST_B: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
/// Nothing ever binds here.
pub const NOWHERE: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 3);

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Check that a second loopback address can be bound.
/// Two-host tests call this and skip gracefully if not.
pub fn loopback_aliases_available() -> bool {
    UdpSocket::bind((HOST_B, 0)).is_ok()
}

/// A UDP port and a TCP port that were free on every address a moment ago.
pub fn free_ports() -> (u16, u16) {
    let udp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).expect("bind spare udp port");
    let tcp = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).expect("bind spare tcp port");
    (
        udp.local_addr().expect("spare udp addr").port(),
        tcp.local_addr().expect("spare tcp addr").port(),
    )
}

/// Config for a host at `local` that announces itself to `announce_to`.
pub fn host_config(local: Ipv4Addr, announce_to: Ipv4Addr, ports: (u16, u16)) -> ChatConfig {
    let mut config = ChatConfig::default();
    config.network.bind_address = local;
    config.network.local_address = Some(local);
    config.network.broadcast_address = Some(announce_to);
    config.network.discovery_port = ports.0;
    config.network.message_port = ports.1;
    config.timing.connect_timeout_secs = 2;
    config
}

/// Wait for the first event matching `pred`, discarding the rest.
pub async fn wait_for(
    rx: &mut EventReceiver,
    what: &str,
    mut pred: impl FnMut(&ChatEvent) -> bool,
) -> Result<ChatEvent> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .with_context(|| format!("timed out waiting for {what}"))?
            .context("event stream closed")?;
        if pred(&event) {
            return Ok(event);
        }
    }
}

/// Matches `PeerUpdated` for `address` with the given online state.
pub fn peer_update(address: Ipv4Addr, online: bool) -> impl FnMut(&ChatEvent) -> bool {
    move |event: &ChatEvent| {
        matches!(event, ChatEvent::PeerUpdated(p) if p.address == address && p.is_online == online)
    }
}

/// Drain whatever is queued right now.
pub fn drain(rx: &mut EventReceiver) -> Vec<ChatEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn free_ports_are_nonzero() {
    let (udp, tcp) = free_ports();
    assert_ne!(udp, 0);
    assert_ne!(tcp, 0);
}
