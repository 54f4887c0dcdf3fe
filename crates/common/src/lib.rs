//! Shared types and utilities for the relay tunnel system
//!
//! This crate provides the control-channel protocol, body encoding, subdomain
//! validation, and error types used by both the relay server and the client.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod utils;
pub mod validation;

mod words;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{BodyEncoding, Message, TunnelRequest, TunnelResponse};
pub use utils::{
    decode_body, encode_body, generate_request_id, generate_subdomain, headers_to_map,
    map_to_headers, scrub_response_headers,
};
pub use validation::validate_subdomain;
