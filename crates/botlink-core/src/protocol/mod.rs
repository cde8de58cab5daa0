//! Protocol modules: wire envelope, message model, packets, registry.
//!
//! One frame on the wire is one JSON envelope carrying a type tag and a raw
//! payload. The payload stays unparsed (`RawValue`) until the registry
//! resolves the tag, so policy and routing never pay for a full decode of
//! packets they end up dropping.

pub mod entity;
pub mod envelope;
pub mod message;
pub mod packet;
pub mod registry;
pub mod variant;

pub use entity::{GroupInfo, Target, UserInfo};
pub use envelope::{Envelope, PROTOCOL_VERSION};
pub use message::{ForwardEntry, Message, MessageMeta};
pub use packet::{Action, Capabilities, EnvironmentProfile, Event, Packet, Query, QueryResult};
pub use registry::{LinkContext, PacketRegistry};
pub use variant::{MessageKind, VariantTable};
