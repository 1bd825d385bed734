//! Inbound message listener.
//!
//! Accepts connections on the message port. Each connection is handled on
//! its own task so a peer that stalls mid-envelope never blocks the accept
//! loop. Connection tasks are aborted when the listener shuts down.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use lanchat_core::wire::{Envelope, MAX_ENVELOPE_BYTES};
use lanchat_services::{ChatEvent, EventBus, PeerRegistry};

/// Pause after a failed accept so a persistent error (fd exhaustion) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct MessageListener {
    listener: TcpListener,
    local_addr: Ipv4Addr,
    registry: PeerRegistry,
    events: EventBus,
    shutdown: broadcast::Receiver<()>,
}

impl MessageListener {
    pub fn new(
        listener: TcpListener,
        local_addr: Ipv4Addr,
        registry: PeerRegistry,
        events: EventBus,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            local_addr,
            registry,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut connections = JoinSet::new();

        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            "message listener starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(in_flight = connections.len(), "message listener shutting down");
                    connections.shutdown().await;
                    return;
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                result = self.listener.accept() => {
                    let (stream, from) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            self.events.status(format!("message accept error: {e}"));
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    tracing::trace!(%from, "message connection accepted");
                    connections.spawn(handle_connection(
                        stream,
                        from,
                        self.local_addr,
                        self.registry.clone(),
                        self.events.clone(),
                    ));
                }
            }
        }
    }
}

/// Read one envelope from `stream` and deliver it.
async fn handle_connection(
    mut stream: TcpStream,
    from: SocketAddr,
    local_addr: Ipv4Addr,
    registry: PeerRegistry,
    events: EventBus,
) {
    let payload = match read_payload(&mut stream).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            tracing::debug!(%from, "oversized payload, dropping connection");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, %from, "failed to read message");
            events.status(format!("message receive error from {from}: {e}"));
            return;
        }
    };

    match Envelope::decode(&payload) {
        Ok(envelope) => deliver(envelope, local_addr, &registry, &events),
        Err(e) => tracing::trace!(error = %e, %from, "dropping non-chat payload"),
    }
}

/// Read to end-of-stream. `None` if the peer sends more than one envelope's worth.
async fn read_payload<R: AsyncRead + Unpin>(reader: R) -> std::io::Result<Option<Vec<u8>>> {
    let mut payload = Vec::new();
    reader
        .take(MAX_ENVELOPE_BYTES as u64 + 1)
        .read_to_end(&mut payload)
        .await?;

    if payload.len() > MAX_ENVELOPE_BYTES {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Normalise the recipient, record the sender, and raise `MessageReceived`.
fn deliver(envelope: Envelope, local_addr: Ipv4Addr, registry: &PeerRegistry, events: &EventBus) {
    let message = envelope.message.with_recipient(local_addr);
    let sender = message.sender_address;

    tracing::debug!(
        peer = %sender,
        bytes = message.content.len(),
        "message received"
    );

    registry.upsert(sender, true);
    events.publish(ChatEvent::MessageReceived { message, sender });
}
