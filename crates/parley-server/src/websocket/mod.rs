//! WebSocket connection management, message routing, and broadcasting.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod session;
