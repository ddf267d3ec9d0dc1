//! Network transport: moves buffers between workers, delivers
//! reconfiguration markers, and carries the event back-channel (spec §4.5).

pub mod channel;
pub mod sink;
pub mod source;
pub mod wire;

pub use channel::Channel;
pub use sink::{NetworkSink, SinkConfig};
pub use source::{NetworkSource, SourceConfig};
