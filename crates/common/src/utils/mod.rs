//! Utility functions shared between the relay server and the client

mod encoding;
mod headers;
mod id;

pub use encoding::{decode_body, encode_body};
pub use headers::{headers_to_map, map_to_headers, scrub_response_headers};
pub use id::{generate_request_id, generate_subdomain};
