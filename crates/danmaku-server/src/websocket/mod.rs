//! WebSocket connection management, heartbeat and event fan-out.

pub mod broadcast;
pub mod connection;
pub mod session;
