pub mod channel;
pub mod connection;
pub mod protocol;

pub use channel::{ChannelId, SubscriptionKey};
pub use connection::{ControlSink, FeedConnection, FeedEvents};
pub use protocol::{decode_inbound, ControlMessage, InboundMessage};
