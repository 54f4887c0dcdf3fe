use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::BodyEncoding;

/// The local service's response, sent back through the tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelResponse {
    /// Must match the `id` of the corresponding request
    pub id: String,

    /// HTTP status code (200, 404, 500, ...)
    pub status: u16,

    /// Header name to list of values; hop-by-hop and length headers are
    /// stripped by the sender, the relay recomputes content-length
    pub headers: HashMap<String, Vec<String>>,

    /// Response body, absent for bodiless responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Encoding of `body`; absent means raw text
    #[serde(default)]
    pub encoding: BodyEncoding,
}

impl TunnelResponse {
    pub fn new(id: String, status: u16) -> Self {
        Self {
            id,
            status,
            headers: HashMap::new(),
            body: None,
            encoding: BodyEncoding::Base64,
        }
    }

    /// Build a response carrying raw bytes as a base64 body
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = Some(crate::encode_body(body));
        self.encoding = BodyEncoding::Base64;
        self
    }

    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Decode the body to raw bytes according to `encoding`
    pub fn body_bytes(&self) -> crate::Result<Vec<u8>> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(body) => match self.encoding {
                BodyEncoding::Base64 => Ok(crate::decode_body(body)?),
                BodyEncoding::Text => Ok(body.as_bytes().to_vec()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
