//! lanchatd — LAN peer discovery and direct messaging.
//!
//! The network half of lanchat: the discovery listener and broadcaster, the
//! message listener and sender, the offline sweeper, and the [`ChatManager`]
//! that owns their lifecycle. The host application drives it through
//! `start`/`stop`/`send`/`discover` and listens on [`ChatManager::subscribe`].

pub mod discovery;
pub mod manager;
pub mod messaging;
pub mod sweeper;

pub use manager::{ChatManager, ManagerState, StartError};
pub use messaging::sender::SendError;
