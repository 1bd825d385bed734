//! Outbound messages.
//!
//! Every send opens a fresh connection, writes one envelope, and closes.
//! The whole exchange, connect included, is bounded by the connect timeout.
//! The outcome feeds the peer registry: a delivered message marks the target
//! online, a network failure marks it offline.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use lanchat_core::wire::{Envelope, WireError, MAX_ENVELOPE_BYTES};
use lanchat_core::ChatMessage;
use lanchat_services::{ChatEvent, EventBus, PeerRegistry};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no target address given")]
    EmptyTarget,

    #[error("not an IPv4 address: {0:?}")]
    InvalidTarget(String),

    #[error("chat is not running")]
    NotStarted,

    #[error("connecting to {target} timed out after {}s", .after.as_secs())]
    Timeout { target: SocketAddrV4, after: Duration },

    #[error("connecting to {target} failed: {source}")]
    Connect {
        target: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("writing to {target} timed out after {}s", .after.as_secs())]
    WriteTimeout { target: SocketAddrV4, after: Duration },

    #[error("message is {size} bytes encoded, peers accept at most {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("writing to {target} failed: {source}")]
    Write {
        target: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Encode(#[from] WireError),
}

impl SendError {
    /// True when the peer could not be reached or dropped the connection,
    /// as opposed to bad input from the caller.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Connect { .. }
                | Self::WriteTimeout { .. }
                | Self::Write { .. }
        )
    }
}

/// Validate caller input before any I/O.
///
/// `Ok(None)` means there is nothing to send (blank content).
pub fn prepare<'a>(
    target: &str,
    content: &'a str,
) -> Result<Option<(Ipv4Addr, &'a str)>, SendError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(SendError::EmptyTarget);
    }
    if content.trim().is_empty() {
        return Ok(None);
    }

    let addr = target
        .parse::<Ipv4Addr>()
        .map_err(|_| SendError::InvalidTarget(target.to_string()))?;
    Ok(Some((addr, content)))
}

#[derive(Clone)]
pub struct MessageSender {
    local_addr: Ipv4Addr,
    port: u16,
    connect_timeout: Duration,
    registry: PeerRegistry,
    events: EventBus,
}

impl MessageSender {
    pub fn new(
        local_addr: Ipv4Addr,
        port: u16,
        connect_timeout: Duration,
        registry: PeerRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            local_addr,
            port,
            connect_timeout,
            registry,
            events,
        }
    }

    /// Deliver `content` to `target` and record the outcome.
    pub async fn send(&self, target: Ipv4Addr, content: &str) -> Result<ChatMessage, SendError> {
        let message = ChatMessage::new(self.local_addr, target, content);
        let dest = SocketAddrV4::new(target, self.port);

        match self.deliver(&message, dest).await {
            Ok(()) => {
                tracing::debug!(peer = %target, bytes = content.len(), "message sent");
                self.registry.upsert(target, true);
                self.events.publish(ChatEvent::MessageSent {
                    message: message.clone(),
                    target,
                });
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, peer = %target, "message send failed");
                self.events.status(format!("send to {target} failed: {e}"));
                if e.is_unreachable() {
                    self.registry.upsert(target, false);
                }
                Err(e)
            }
        }
    }

    async fn deliver(&self, message: &ChatMessage, dest: SocketAddrV4) -> Result<(), SendError> {
        let bytes = Envelope::new(message.clone()).encode()?;
        if bytes.len() > MAX_ENVELOPE_BYTES {
            return Err(SendError::TooLarge {
                size: bytes.len(),
                limit: MAX_ENVELOPE_BYTES,
            });
        }

        let deadline = Instant::now() + self.connect_timeout;
        let stream = time::timeout_at(deadline, TcpStream::connect(dest))
            .await
            .map_err(|_| SendError::Timeout {
                target: dest,
                after: self.connect_timeout,
            })?
            .map_err(|source| SendError::Connect { target: dest, source })?;

        write_envelope(stream, &bytes, dest, deadline, self.connect_timeout).await
    }
}

/// Write, flush and close, giving up at `deadline`.
async fn write_envelope(
    mut stream: TcpStream,
    bytes: &[u8],
    dest: SocketAddrV4,
    deadline: Instant,
    budget: Duration,
) -> Result<(), SendError> {
    let write = |source| SendError::Write { target: dest, source };
    let exchange = async {
        stream.write_all(bytes).await.map_err(write)?;
        stream.flush().await.map_err(write)?;
        stream.shutdown().await.map_err(write)
    };

    time::timeout_at(deadline, exchange)
        .await
        .map_err(|_| SendError::WriteTimeout {
            target: dest,
            after: budget,
        })?
}
