use serde::{Deserialize, Serialize};

use super::{TunnelRequest, TunnelResponse};
use crate::error::Result;

/// All control-channel traffic is wrapped in this typed envelope.
///
/// Unknown `type` tags fail to decode; the receiver logs and drops the frame
/// instead of tearing down the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First message on a fresh channel (client -> server)
    Auth {
        secret: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subdomain: Option<String>,
    },

    /// Tunnel established (server -> client)
    Ready { subdomain: String, url: String },

    /// Terminal rejection; the channel is closed right after (server -> client)
    Error { message: String },

    /// Forwarded HTTP request (server -> client)
    Request(TunnelRequest),

    /// Completed HTTP response (client -> server)
    Response(TunnelResponse),
}

impl Message {
    /// Serialize to a single wire unit
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a single self-contained wire unit
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_serialization() {
        let msg = Message::Auth {
            secret: "s3cret".to_string(),
            subdomain: None,
        };
        let json = msg.encode().unwrap();
        assert_eq!(json, r#"{"type":"auth","secret":"s3cret"}"#);

        let msg = Message::Auth {
            secret: "s3cret".to_string(),
            subdomain: Some("myapp".to_string()),
        };
        let json = msg.encode().unwrap();
        assert!(json.contains(r#""subdomain":"myapp"#));

        match Message::decode(&json).unwrap() {
            Message::Auth { secret, subdomain } => {
                assert_eq!(secret, "s3cret");
                assert_eq!(subdomain.as_deref(), Some("myapp"));
            }
            _ => panic!("Expected Auth"),
        }
    }

    #[test]
    fn test_ready_serialization() {
        let msg = Message::Ready {
            subdomain: "calm-river-stone".to_string(),
            url: "https://calm-river-stone.tunnel.example.com".to_string(),
        };

        let json = msg.encode().unwrap();
        assert!(json.contains(r#""type":"ready"#));
        assert!(json.contains(r#""subdomain":"calm-river-stone"#));

        match Message::decode(&json).unwrap() {
            Message::Ready { subdomain, url } => {
                assert_eq!(subdomain, "calm-river-stone");
                assert!(url.starts_with("https://"));
            }
            _ => panic!("Expected Ready"),
        }
    }

    #[test]
    fn test_error_serialization() {
        let msg = Message::Error {
            message: "Invalid secret".to_string(),
        };

        let json = msg.encode().unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Invalid secret"}"#);

        match Message::decode(&json).unwrap() {
            Message::Error { message } => assert_eq!(message, "Invalid secret"),
            _ => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_request_envelope() {
        let req = TunnelRequest::new(
            "a1b2c3d4".to_string(),
            "GET".to_string(),
            "/api/v1/users".to_string(),
        );

        let json = Message::Request(req).encode().unwrap();
        assert!(json.contains(r#""type":"request"#));
        assert!(json.contains(r#""id":"a1b2c3d4"#));

        assert!(matches!(
            Message::decode(&json).unwrap(),
            Message::Request(_)
        ));
    }

    #[test]
    fn test_response_envelope() {
        let res = TunnelResponse::new("a1b2c3d4".to_string(), 200).with_body(b"hello");

        let json = Message::Response(res).encode().unwrap();
        assert!(json.contains(r#""type":"response"#));
        assert!(json.contains(r#""status":200"#));

        match Message::decode(&json).unwrap() {
            Message::Response(res) => assert_eq!(res.body_bytes().unwrap(), b"hello"),
            _ => panic!("Expected Response"),
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let result = Message::decode(r#"{"type":"ping"}"#);
        assert!(result.is_err());

        let result = Message::decode(r#"{"type":"shutdown","reason":"maintenance"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(Message::decode("not json at all").is_err());
        assert!(Message::decode("{}").is_err());
        assert!(Message::decode(r#"{"secret":"no-tag"}"#).is_err());
        // Missing required variant field
        assert!(Message::decode(r#"{"type":"ready","subdomain":"x"}"#).is_err());
    }
}
