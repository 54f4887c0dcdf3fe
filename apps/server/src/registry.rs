//! Tunnel registry: the single source of truth for live subdomains
//!
//! Maps a subdomain to the control channel that registered it. The registry
//! is the only writer of the mapping; a reservation exists from successful
//! authentication until the channel closes.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_common::{Message, Result, TunnelError};
use tokio::sync::mpsc;
use tracing::info;

/// One authenticated client channel
#[derive(Debug)]
pub struct TunnelConnection {
    /// Unique lowercase key, 3-63 chars
    pub subdomain: String,

    /// Outbound handle used to push protocol messages to the client;
    /// a writer task drains the other end into the WebSocket sink
    sender: mpsc::Sender<Message>,

    /// When the tunnel was established
    pub connected_at: Instant,
}

impl TunnelConnection {
    pub fn new(subdomain: impl Into<String>, sender: mpsc::Sender<Message>) -> Self {
        Self {
            subdomain: subdomain.into(),
            sender,
            connected_at: Instant::now(),
        }
    }

    /// A connection can be present in the registry but mid-teardown;
    /// callers must check this before dispatching to it.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Push a protocol message to the client
    pub async fn forward(&self, message: Message) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TunnelError::ChannelClosed)
    }
}

/// Registry of active tunnels keyed by subdomain
#[derive(Debug, Default)]
pub struct TunnelRegistry {
    tunnels: DashMap<String, Arc<TunnelConnection>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert: under concurrent attempts for the same name
    /// exactly one caller wins, the rest observe `SubdomainTaken`.
    pub fn reserve(&self, connection: TunnelConnection) -> Result<Arc<TunnelConnection>> {
        match self.tunnels.entry(connection.subdomain.clone()) {
            Entry::Occupied(_) => Err(TunnelError::SubdomainTaken(connection.subdomain)),
            Entry::Vacant(slot) => {
                let connection = Arc::new(connection);
                slot.insert(Arc::clone(&connection));
                info!(subdomain = %connection.subdomain, "tunnel registered");
                Ok(connection)
            }
        }
    }

    /// Live connection for a subdomain, if any
    pub fn lookup(&self, subdomain: &str) -> Option<Arc<TunnelConnection>> {
        self.tunnels.get(subdomain).map(|entry| Arc::clone(&entry))
    }

    /// Idempotent removal, invoked when the owning channel closes
    pub fn release(&self, subdomain: &str) -> Option<Arc<TunnelConnection>> {
        let removed = self.tunnels.remove(subdomain).map(|(_, conn)| conn);
        if removed.is_some() {
            info!(subdomain = %subdomain, "tunnel released");
        }
        removed
    }

    /// Number of live tunnels, exposed by the health probe
    pub fn count(&self) -> usize {
        self.tunnels.len()
    }
}
