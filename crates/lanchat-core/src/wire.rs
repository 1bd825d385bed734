//! lanchat wire format.
//!
//! Discovery and messaging share nothing but the idea of a signature:
//!
//! - Discovery datagrams (UDP) are the bare ASCII signature. Identity comes
//!   from the datagram's source address, never from its content. A hello is
//!   answered once, by unicast, with a [`Hello::Reply`]; replies are not
//!   answered, so two peers never bounce hellos back and forth.
//! - Messages (TCP) are one UTF-8 JSON [`Envelope`] per connection. The
//!   sender writes the envelope, flushes, and closes; the receiver reads to
//!   end-of-stream.
//!
//! Anything that fails the signature check is noise from some other program
//! on the LAN and is dropped without a reply.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

// ── Constants ─────────────────────────────────────────────────────────────────

/// UDP port for discovery hellos.
pub const DISCOVERY_PORT: u16 = 45900;

/// TCP port for message envelopes. Must differ from [`DISCOVERY_PORT`].
pub const MESSAGE_PORT: u16 = 45901;

/// Payload of every discovery datagram.
/// Receivers accept any datagram that starts with these bytes.
pub const DISCOVERY_SIGNATURE: &str = "SOCHO_CHAT_HELLO_V1";

/// Unicast answer to a hello. Carries the signature as a prefix so it counts
/// as presence, but is itself never answered. Peers that only know the bare
/// hello still match it by prefix and answer it like any hello.
pub const DISCOVERY_REPLY: &str = "SOCHO_CHAT_HELLO_V1/ACK";

/// `signature` field of every message envelope. Compared exactly.
pub const MESSAGE_SIGNATURE: &str = "SOCHO_CHAT_MESSAGE_V1";

/// Default presence broadcast interval in seconds.
pub const BROADCAST_INTERVAL_SECS: u64 = 10;

/// Default silence window in seconds before an online peer is demoted.
/// The sweep timer runs on the same period.
pub const PEER_TIMEOUT_SECS: u64 = 45;

/// Default TCP connect timeout for outbound messages, in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Receive buffer for discovery datagrams. Hellos are a few dozen bytes.
pub const MAX_DATAGRAM: usize = 512;

/// Upper bound on a single inbound envelope.
/// Connections that send more are dropped as noise.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

// ── Discovery ─────────────────────────────────────────────────────────────────

/// The two kinds of discovery datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hello {
    /// Broadcast (or manual) announcement. Answered with a [`Hello::Reply`].
    Announce,
    /// Unicast answer to an announcement.
    Reply,
}

impl Hello {
    /// Bytes on the wire.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Hello::Announce => DISCOVERY_SIGNATURE.as_bytes(),
            Hello::Reply => DISCOVERY_REPLY.as_bytes(),
        }
    }

    /// Classify a datagram. `None` means it is not ours.
    pub fn parse(data: &[u8]) -> Option<Hello> {
        if data.starts_with(DISCOVERY_REPLY.as_bytes()) {
            Some(Hello::Reply)
        } else if data.starts_with(DISCOVERY_SIGNATURE.as_bytes()) {
            Some(Hello::Announce)
        } else {
            None
        }
    }
}

/// Subnet broadcast address for a local address.
///
/// Replaces the last IPv4 octet with 255. The subnet mask is never queried,
/// so this is only right for /24 networks (or broader ones where the .255
/// host happens to reach the segment). Anything that is not a four-octet
/// address falls back to the limited broadcast address 255.255.255.255.
pub fn subnet_broadcast(local: IpAddr) -> Ipv4Addr {
    match local {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Ipv4Addr::new(a, b, c, 255)
        }
        IpAddr::V6(_) => Ipv4Addr::BROADCAST,
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Signed wrapper around a [`ChatMessage`]. The whole payload of one TCP
/// message connection.
///
/// ```json
/// {"signature":"SOCHO_CHAT_MESSAGE_V1",
///  "message":{"senderAddress":"192.168.1.10","recipientAddress":"192.168.1.20",
///             "content":"ping","timestampUtc":"2024-05-01T12:00:00Z"}}
/// ```
///
/// Unknown fields are ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub signature: String,
    pub message: ChatMessage,
}

impl Envelope {
    /// Wrap a message with the current protocol signature.
    pub fn new(message: ChatMessage) -> Self {
        Self {
            signature: MESSAGE_SIGNATURE.to_string(),
            message,
        }
    }

    /// Serialize to the UTF-8 JSON bytes written on the wire.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Parse and validate one envelope read from a connection.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(WireError::Empty);
        }

        let envelope: Envelope = serde_json::from_slice(bytes).map_err(WireError::Malformed)?;

        if envelope.signature != MESSAGE_SIGNATURE {
            return Err(WireError::BadSignature(envelope.signature));
        }

        Ok(envelope)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("empty payload")]
    Empty,

    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unexpected signature: {0:?}")]
    BadSignature(String),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}
