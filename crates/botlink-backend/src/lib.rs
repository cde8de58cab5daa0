//! botlink backend library entry.
//!
//! One backend process serves one chat network: it keeps a link to the hub
//! alive through the reconnect supervisor, answers the hub's queries against
//! the platform session, and forwards native chat events up the link.

pub mod client;
pub mod config;
pub mod responder;
pub mod session;
pub mod supervisor;
