use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a message body string maps back to bytes.
///
/// Both endpoints always emit `base64` so that binary bodies survive either
/// direction; `text` is the lenient reading applied when the field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Base64,
    #[default]
    Text,
}

/// An HTTP request forwarded from the relay to the tunnel client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRequest {
    /// Correlation token linking this request to its eventual response
    pub id: String,

    /// HTTP method (GET, POST, PUT, DELETE, ...)
    pub method: String,

    /// Request path including the query string, e.g. "/api/users?limit=10"
    pub path: String,

    /// Header name to list of values; multi-valued headers are preserved
    pub headers: HashMap<String, Vec<String>>,

    /// Request body, absent for bodiless requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Encoding of `body`; absent means raw text
    #[serde(default)]
    pub encoding: BodyEncoding,
}

impl TunnelRequest {
    pub fn new(id: String, method: String, path: String) -> Self {
        Self {
            id,
            method,
            path,
            headers: HashMap::new(),
            body: None,
            encoding: BodyEncoding::Base64,
        }
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
}
