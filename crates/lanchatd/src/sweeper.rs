//! Offline sweeper.
//!
//! There is no goodbye in the protocol; a peer that goes quiet is demoted
//! once its last sighting is older than the timeout.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use lanchat_services::PeerRegistry;

/// Sweep `registry` every `period` until shutdown.
pub async fn sweep_loop(
    registry: PeerRegistry,
    period: Duration,
    timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("sweeper shutting down");
                return;
            }

            _ = interval.tick() => {
                let demoted = registry.sweep(timeout);
                if !demoted.is_empty() {
                    tracing::debug!(count = demoted.len(), "marked silent peers offline");
                }
            }
        }
    }
}
