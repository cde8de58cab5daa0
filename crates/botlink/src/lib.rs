//! Top-level facade crate for botlink.
//!
//! Re-exports the protocol primitives and the connection runtime so session
//! implementations and tooling can depend on a single crate.

pub mod core {
    pub use botlink_core::*;
}

pub mod link {
    pub use botlink_link::*;
}
