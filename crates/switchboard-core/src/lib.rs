//! Shared vocabulary for the switchboard relay: peer and connection
//! identifiers, the signaling wire envelope, and routing errors.

pub mod errors;
pub mod ids;
pub mod wire;

pub use errors::RelayError;
pub use ids::{ClientId, ConnectionId};
pub use wire::{extract_receiver, SignalingMessage};
