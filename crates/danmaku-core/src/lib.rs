//! # danmaku-core
//!
//! The shared-state broadcast and authorization core of the danmaku relay.
//!
//! - **Display settings**: [`SettingsStore`] with clamped partial updates and
//!   background validation
//! - **Banned words**: [`BannedWords`] set and the [`is_banned`] substring filter
//! - **Lanes**: [`LaneAllocator`] round-robin cursor
//! - **Admin gate**: per-session [`Session`] flag granted by [`AdminGate`]
//! - **Protocol**: [`ClientEvent`] / [`ServerEvent`] wire types
//! - **Relay**: [`Relay`] orchestration with fan-out through [`Multicast`]
//!
//! Nothing in this crate performs I/O. The transport and the single-owner
//! task that serializes access to [`Relay`] live in `danmaku-server`.

#![deny(unsafe_code)]

pub mod auth;
pub mod display;
pub mod errors;
pub mod filter;
pub mod ids;
pub mod lanes;
pub mod protocol;
pub mod relay;

pub use auth::{AdminGate, LoginOutcome, Session};
pub use display::{Background, BackgroundDescriptor, DisplaySettings, SettingsStore};
pub use errors::{ProtocolError, RelayError};
pub use filter::{BannedWords, is_banned};
pub use ids::SessionId;
pub use lanes::LaneAllocator;
pub use protocol::{ClientEvent, ServerEvent, Snapshot};
pub use relay::{DropReason, Multicast, Outcome, Relay};
