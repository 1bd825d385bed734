//! Presence broadcast.
//!
//! Periodically sends a hello to the subnet broadcast address so other
//! instances on the segment can discover this one.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use lanchat_core::wire::Hello;
use lanchat_services::EventBus;

/// Send one hello to `target`.
pub async fn announce(socket: &UdpSocket, target: SocketAddrV4) -> std::io::Result<usize> {
    socket
        .send_to(Hello::Announce.as_bytes(), SocketAddr::V4(target))
        .await
}

/// Broadcast a hello every `every` until shutdown.
///
/// The first hello goes out one period after start; the caller is expected
/// to announce once immediately. A failed send is reported and the loop
/// carries on with the next tick.
pub async fn broadcast_loop(
    socket: Arc<UdpSocket>,
    target: SocketAddrV4,
    every: Duration,
    events: EventBus,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        dest = %target,
        interval_secs = every.as_secs(),
        "presence broadcast starting"
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("presence broadcast shutting down");
                return;
            }

            _ = interval.tick() => {
                match announce(&socket, target).await {
                    Ok(n) => tracing::trace!(bytes = n, "presence broadcast sent"),
                    Err(e) => {
                        tracing::warn!(error = %e, dest = %target, "presence broadcast failed");
                        events.status(format!("presence broadcast to {target} failed: {e}"));
                    }
                }
            }
        }
    }
}
