//! botlink core: transport-agnostic protocol primitives shared by the hub
//! and every backend process.
//!
//! This crate defines the wire envelope, the network-agnostic message model,
//! the packet taxonomy, and the packet registry that rehydrates typed packets
//! from a wire tag plus connection context. It intentionally carries no
//! transport or runtime dependencies so both processes (and tests) can reuse
//! it unchanged.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `BotlinkError`/`Result` so a malformed
//! packet can never take a process down.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{BotlinkError, Result};
