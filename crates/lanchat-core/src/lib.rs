//! lanchat-core — shared types, wire format, and configuration.
//! All other lanchat crates depend on this one.

pub mod config;
pub mod message;
pub mod wire;

pub use message::ChatMessage;
pub use wire::{Envelope, WireError};
