//! Per-connection WebSocket machinery.

pub mod connection;
pub mod heartbeat;
pub mod session;
