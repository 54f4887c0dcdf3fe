//! Request handlers: the control-channel state machine and the public
//! HTTP forwarding surface

mod channel;
mod forward;

pub use channel::channel_handler;
pub use forward::forward_handler;
