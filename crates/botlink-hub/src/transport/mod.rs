//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler that hosts one backend link per socket.

pub mod ws;
