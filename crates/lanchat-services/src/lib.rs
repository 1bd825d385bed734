//! lanchat-services — shared state between the network tasks and the host.
//!
//! Nothing in here touches a socket. The registry and the event bus are
//! cheap to clone and safe to use from any task.

pub mod events;
pub mod peer;

pub use events::{ChatEvent, EventBus, EventReceiver};
pub use peer::{Peer, PeerRegistry};
