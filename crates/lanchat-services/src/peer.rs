//! Peer registry — every instance this one has seen or remembers.
//!
//! Written from the discovery listener, the message listener, the send path
//! and the sweeper, read by the host. Each mutation is a single
//! make-or-merge under the key's shard lock, so concurrent writers touching
//! different peers never contend and writers touching the same peer never
//! lose an update. `PeerUpdated` is published before that lock is released,
//! so a subscriber sees one peer's updates in the order they were applied.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::events::{ChatEvent, EventBus};

/// Tracked state for one peer, keyed by its IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: Ipv4Addr,

    pub is_online: bool,

    /// Last live sighting. `None` for peers restored from history that have
    /// not been seen since.
    pub last_online: Option<DateTime<Utc>>,

    /// Remembered across sessions (seen live at least once, or restored).
    pub is_known: bool,
}

impl Peer {
    fn restored(address: Ipv4Addr) -> Self {
        Self {
            address,
            is_online: false,
            last_online: None,
            is_known: true,
        }
    }

    /// Online, but silent for longer than `timeout` as of `now`.
    fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if !self.is_online {
            return false;
        }
        match self.last_online {
            Some(seen) => (now - seen).to_std().map_or(false, |silence| silence > timeout),
            None => true,
        }
    }
}

/// Shared by the discovery listener, the message path and the sweeper.
#[derive(Clone)]
pub struct PeerRegistry {
    peers: Arc<DashMap<Ipv4Addr, Peer>>,
    events: EventBus,
}

impl PeerRegistry {
    /// Create an empty registry that reports changes on `events`.
    pub fn new(events: EventBus) -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Record a live sighting (or a failed contact, with `online = false`).
    pub fn upsert(&self, address: Ipv4Addr, online: bool) -> Peer {
        self.upsert_at(address, online, Utc::now())
    }

    pub fn upsert_at(&self, address: Ipv4Addr, online: bool, now: DateTime<Utc>) -> Peer {
        let mut entry = self.peers.entry(address).or_insert_with(|| Peer {
            address,
            is_online: online,
            last_online: Some(now),
            is_known: true,
        });
        entry.is_online = online;
        entry.last_online = Some(now);
        entry.is_known = true;
        let peer = entry.clone();

        // Published under the shard lock so events for one peer keep mutation order.
        self.events.publish(ChatEvent::PeerUpdated(peer.clone()));
        drop(entry);

        tracing::trace!(peer = %address, online, "peer upserted");
        peer
    }

    /// Remember a peer from persisted history.
    ///
    /// A new entry starts offline and never-seen-live. An existing entry only
    /// gains `is_known`; whatever live status it already has is kept.
    pub fn restore(&self, address: Ipv4Addr) -> Peer {
        let entry = self
            .peers
            .entry(address)
            .and_modify(|p| p.is_known = true)
            .or_insert_with(|| Peer::restored(address));
        let peer = entry.clone();
        self.events.publish(ChatEvent::PeerUpdated(peer.clone()));
        drop(entry);

        tracing::debug!(peer = %address, online = peer.is_online, "peer restored from history");
        peer
    }

    pub fn get(&self, address: &Ipv4Addr) -> Option<Peer> {
        self.peers.get(address).map(|p| p.clone())
    }

    /// Point-in-time copy of every peer, sorted by address.
    pub fn snapshot(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.iter().map(|e| e.value().clone()).collect();
        peers.sort_by_key(|p| p.address);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Demote online peers silent for longer than `timeout`. Returns the demoted peers.
    pub fn sweep(&self, timeout: Duration) -> Vec<Peer> {
        self.sweep_at(Utc::now(), timeout)
    }

    pub fn sweep_at(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<Peer> {
        let candidates: Vec<Ipv4Addr> = self
            .snapshot()
            .into_iter()
            .filter(|p| p.is_stale(now, timeout))
            .map(|p| p.address)
            .collect();

        let mut demoted = Vec::new();
        for address in candidates {
            // Re-check under the shard lock: a sighting may have landed since the snapshot.
            if let Some(mut entry) = self.peers.get_mut(&address) {
                if entry.is_stale(now, timeout) {
                    entry.is_online = false;
                    self.events.publish(ChatEvent::PeerUpdated(entry.clone()));
                    demoted.push(entry.clone());
                }
            }
        }

        for peer in &demoted {
            tracing::debug!(peer = %peer.address, "peer went silent, marked offline");
        }
        demoted
    }
}
