//! # parley-server
//!
//! Axum HTTP + `WebSocket` chat server.
//!
//! - `/chat`: sign-up, sign-in and chat broadcast over JSON text frames
//! - `/test`: legacy endpoint answering every frame with a fixed reply
//! - `/health` and `/metrics` for operators
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, load_config_from_path};
pub use errors::ServerError;
pub use server::ParleyServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::broadcast::{BroadcastReport, SessionRegistry};
pub use websocket::connection::{ClientConnection, SessionState};
pub use websocket::handler::{MessageRouter, RouteOutcome};
