//! botlink link: the connection runtime shared by the hub and every backend.
//!
//! Owns one duplex frame transport per connection, serializes writes through
//! a bounded queue, dispatches inbound packets in arrival order, and layers
//! request/response correlation on top of the otherwise fire-and-forget
//! packet stream.

pub mod connection;
pub mod correlate;
pub mod dispatch;
pub mod transport;

pub use connection::{run_link, Connection, LinkConfig, PacketListener};
pub use correlate::QueryCorrelator;
pub use dispatch::{Dispatcher, LinkHook, PacketHandler};
pub use transport::{channel_pair, ChannelSink, ChannelStream, Frame, FrameSink, FrameStream};
