//! # danmaku-server
//!
//! Axum HTTP + `WebSocket` server for the danmaku relay.
//!
//! - `WebSocket` gateway: one connection is one session, with heartbeat and
//!   a bounded outbound queue per connection
//! - Relay task that applies every client event in arrival order
//! - HTTP endpoints: health, Prometheus metrics, media upload, static assets
//! - Graceful shutdown via `CancellationToken`, waiting on tracked sessions

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod upload;
pub mod websocket;

pub use config::ServerConfig;
pub use relay::{RelayCommand, RelayHandle, spawn_relay};
pub use server::{AppState, DanmakuServer};
