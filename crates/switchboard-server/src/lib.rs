//! Signaling relay server: peers connect over WebSocket with an identifier
//! and exchange JSON frames addressed by `receiverId`.

pub mod config;
pub mod errors;
pub mod health;
pub mod loader;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ConfigError;
pub use loader::load_config;
pub use registry::Registry;
pub use server::{build_router, start, AppState, ServerHandle};
pub use websocket::connection::{ClientHandle, CloseReason};
