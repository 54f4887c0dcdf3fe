//! Control-channel protocol
//!
//! Every unit transmitted over the channel is a [`Message`], a closed tagged
//! union serialized as a single JSON object.

mod message;
mod request;
mod response;

pub use message::Message;
pub use request::{BodyEncoding, TunnelRequest};
pub use response::TunnelResponse;
