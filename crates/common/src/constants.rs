use std::time::Duration;

/// How long the relay waits for a client to answer a forwarded request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed delay between client reconnection attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bounded retries when generating a random subdomain
pub const MAX_ALLOCATION_ATTEMPTS: usize = 10;

/// Number of words joined into a generated subdomain
pub const SUBDOMAIN_WORDS: usize = 3;

/// Maximum request/response body size carried over the channel (2 MiB)
pub const MAX_BODY_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Path of the control-channel WebSocket endpoint on the relay server
pub const CONTROL_CHANNEL_PATH: &str = "/relay";

/// Depth of the per-tunnel outbound message queue
pub const CHANNEL_QUEUE_DEPTH: usize = 64;

/// Default listen port for the relay server
pub const DEFAULT_SERVER_PORT: u16 = 8080;
