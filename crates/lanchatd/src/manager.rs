//! Chat manager.
//!
//! Owns both sockets and every background loop for as long as chat is
//! running. All loops share one shutdown channel created by [`ChatManager::start`];
//! [`ChatManager::stop`] fires it and waits for them to finish. Dropping a
//! running manager closes the channel as well, which ends the loops without
//! waiting for them.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use lanchat_core::config::ChatConfig;
use lanchat_core::wire::subnet_broadcast;
use lanchat_core::ChatMessage;
use lanchat_services::{EventBus, EventReceiver, Peer, PeerRegistry};

use crate::discovery::{self, broadcast as presence, listener::DiscoveryListener};
use crate::messaging::listener::MessageListener;
use crate::messaging::sender::{self, MessageSender, SendError};
use crate::sweeper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("no usable local IPv4 address")]
    NoLocalAddress,

    #[error("failed to bind {socket} socket on {addr}: {source}")]
    Bind {
        socket: &'static str,
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },
}

struct Status {
    state: ManagerState,
    local_address: Option<Ipv4Addr>,
}

/// Everything that exists only while running.
struct Running {
    discovery_socket: Arc<UdpSocket>,
    broadcast_target: SocketAddrV4,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct ChatManager {
    config: ChatConfig,
    events: EventBus,
    registry: PeerRegistry,
    status: Mutex<Status>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl ChatManager {
    pub fn new(config: ChatConfig) -> Self {
        let events = EventBus::new();
        let registry = PeerRegistry::new(events.clone());
        Self {
            config,
            events,
            registry,
            status: Mutex::new(Status {
                state: ManagerState::Stopped,
                local_address: None,
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Receive every event raised from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn state(&self) -> ManagerState {
        self.lock_status().state
    }

    /// This instance's address, once `start` has resolved it.
    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.lock_status().local_address
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Remember a peer from history. Meant for startup, before live traffic.
    pub fn restore_peer(&self, address: Ipv4Addr) -> Peer {
        self.registry.restore(address)
    }

    /// Bind both sockets, launch the loops, and announce once.
    ///
    /// Does nothing if already running. On error nothing stays bound.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("start ignored, already running");
            return Ok(());
        }

        self.set_state(ManagerState::Starting);
        match self.launch().await {
            Ok((local, launched)) => {
                {
                    let mut status = self.lock_status();
                    status.state = ManagerState::Running;
                    status.local_address = Some(local);
                }
                self.events.status(format!(
                    "chat started on {local}, announcing to {}",
                    launched.broadcast_target
                ));

                if let Err(e) =
                    presence::announce(&launched.discovery_socket, launched.broadcast_target).await
                {
                    tracing::warn!(error = %e, "initial presence broadcast failed");
                    self.events
                        .status(format!("initial presence broadcast failed: {e}"));
                }

                *running = Some(launched);
                Ok(())
            }
            Err(e) => {
                self.set_state(ManagerState::Stopped);
                tracing::error!(error = %e, "chat failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<(Ipv4Addr, Running), StartError> {
        let net = &self.config.network;
        let timing = &self.config.timing;

        let local = discovery::resolve_local_ipv4(net.local_address)
            .ok_or(StartError::NoLocalAddress)?;

        let udp_addr = SocketAddrV4::new(net.bind_address, net.discovery_port);
        let discovery_socket = Arc::new(discovery::bind_discovery_socket(udp_addr).map_err(
            |source| StartError::Bind {
                socket: "discovery",
                addr: udp_addr,
                source,
            },
        )?);

        let tcp_addr = SocketAddrV4::new(net.bind_address, net.message_port);
        let message_listener = TcpListener::bind(tcp_addr)
            .await
            .map_err(|source| StartError::Bind {
                socket: "message",
                addr: tcp_addr,
                source,
            })?;

        let broadcast_ip = net
            .broadcast_address
            .unwrap_or_else(|| subnet_broadcast(IpAddr::V4(local)));
        let broadcast_target = SocketAddrV4::new(broadcast_ip, net.discovery_port);

        tracing::info!(
            %local,
            discovery = %udp_addr,
            message = %tcp_addr,
            broadcast = %broadcast_target,
            "chat sockets bound"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let tasks = vec![
            (
                "discovery listener",
                tokio::spawn(
                    DiscoveryListener::new(
                        discovery_socket.clone(),
                        local,
                        net.discovery_port,
                        self.registry.clone(),
                        self.events.clone(),
                        shutdown_tx.subscribe(),
                    )
                    .run(),
                ),
            ),
            (
                "presence broadcast",
                tokio::spawn(presence::broadcast_loop(
                    discovery_socket.clone(),
                    broadcast_target,
                    timing.broadcast_interval(),
                    self.events.clone(),
                    shutdown_tx.subscribe(),
                )),
            ),
            (
                "message listener",
                tokio::spawn(
                    MessageListener::new(
                        message_listener,
                        local,
                        self.registry.clone(),
                        self.events.clone(),
                        shutdown_tx.subscribe(),
                    )
                    .run(),
                ),
            ),
            (
                "sweeper",
                tokio::spawn(sweeper::sweep_loop(
                    self.registry.clone(),
                    timing.peer_timeout(),
                    timing.peer_timeout(),
                    shutdown_tx.subscribe(),
                )),
            ),
        ];

        Ok((
            local,
            Running {
                discovery_socket,
                broadcast_target,
                shutdown_tx,
                tasks,
            },
        ))
    }

    /// Signal every loop, wait for them, and release both sockets.
    ///
    /// Does nothing if not running.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(launched) = running.take() else {
            tracing::debug!("stop ignored, not running");
            return;
        };

        self.set_state(ManagerState::Stopping);

        let Running {
            discovery_socket,
            shutdown_tx,
            tasks,
            ..
        } = launched;
        let _ = shutdown_tx.send(());
        drop(discovery_socket);

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "background task ended abnormally");
            }
        }

        self.set_state(ManagerState::Stopped);
        self.events.status("chat stopped");
    }

    /// Send one presence hello now, outside the broadcast cadence.
    ///
    /// Returns `Ok(false)` if not running.
    pub async fn discover(&self) -> std::io::Result<bool> {
        let running = self.running.lock().await;
        let Some(launched) = running.as_ref() else {
            return Ok(false);
        };

        match presence::announce(&launched.discovery_socket, launched.broadcast_target).await {
            Ok(_) => {
                tracing::debug!(dest = %launched.broadcast_target, "manual discovery sent");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "manual discovery failed");
                self.events.status(format!("discovery broadcast failed: {e}"));
                Err(e)
            }
        }
    }

    /// Send `content` to the peer at `target`.
    ///
    /// Input is checked before any I/O: a blank target is an error, blank
    /// content is `Ok(None)`. Network failures are reported on the status
    /// channel, mark the peer offline, and come back as `Err`.
    pub async fn send(
        &self,
        target: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, SendError> {
        let Some((addr, content)) = sender::prepare(target, content)? else {
            return Ok(None);
        };
        let local = self.local_address().ok_or(SendError::NotStarted)?;

        MessageSender::new(
            local,
            self.config.network.message_port,
            self.config.timing.connect_timeout(),
            self.registry.clone(),
            self.events.clone(),
        )
        .send(addr, content)
        .await
        .map(Some)
    }

    fn set_state(&self, state: ManagerState) {
        tracing::debug!(?state, "chat state");
        self.lock_status().state = state;
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}
