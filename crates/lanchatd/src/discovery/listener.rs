//! Discovery listener.
//!
//! Receives hellos on the discovery port, records the sender as online, and
//! answers announcements with a unicast reply so a freshly started instance
//! learns about its neighbours without waiting for their next broadcast.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use lanchat_core::wire::{Hello, MAX_DATAGRAM};
use lanchat_services::{EventBus, PeerRegistry};

/// Pause after a failed receive so a persistent socket error does not spin.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// A hello worth acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sighting {
    pub peer: Ipv4Addr,
    pub kind: Hello,
}

/// Decide whether a datagram is a hello from some other instance.
///
/// Foreign payloads, our own broadcasts looping back, and IPv6 sources all
/// yield `None`.
pub fn classify(data: &[u8], from: SocketAddr, local_addr: Ipv4Addr) -> Option<Sighting> {
    let kind = Hello::parse(data)?;

    let peer = match from.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
    };

    if peer == local_addr {
        return None;
    }

    Some(Sighting { peer, kind })
}

pub struct DiscoveryListener {
    socket: Arc<UdpSocket>,
    local_addr: Ipv4Addr,
    discovery_port: u16,
    registry: PeerRegistry,
    events: EventBus,
    shutdown: broadcast::Receiver<()>,
}

impl DiscoveryListener {
    pub fn new(
        socket: Arc<UdpSocket>,
        local_addr: Ipv4Addr,
        discovery_port: u16,
        registry: PeerRegistry,
        events: EventBus,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            local_addr,
            discovery_port,
            registry,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        tracing::info!(local = %self.local_addr, "discovery listener starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("discovery listener shutting down");
                    return;
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, from) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            self.recv_failed(&e).await;
                            continue;
                        }
                    };

                    match classify(&buf[..len], from, self.local_addr) {
                        Some(sighting) => self.handle_sighting(sighting).await,
                        None => tracing::trace!(%from, len, "ignoring datagram"),
                    }
                }
            }
        }
    }

    async fn recv_failed(&self, e: &io::Error) {
        tracing::warn!(error = %e, "discovery recv_from failed");
        self.events.status(format!("discovery receive error: {e}"));
        tokio::time::sleep(RECV_BACKOFF).await;
    }

    async fn handle_sighting(&self, sighting: Sighting) {
        tracing::debug!(peer = %sighting.peer, kind = ?sighting.kind, "hello received");

        self.registry.upsert(sighting.peer, true);

        if sighting.kind == Hello::Announce {
            let dest = SocketAddrV4::new(sighting.peer, self.discovery_port);
            if let Err(e) = self
                .socket
                .send_to(Hello::Reply.as_bytes(), SocketAddr::V4(dest))
                .await
            {
                tracing::warn!(error = %e, peer = %dest, "discovery reply failed");
            }
        }
    }
}
