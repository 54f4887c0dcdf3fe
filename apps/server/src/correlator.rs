//! Request correlator: routes each tunneled response back to the one HTTP
//! request that is waiting for it
//!
//! An id exists in the map only between dispatch and the first of two
//! completion paths: a matching `response` frame, or the per-request
//! deadline. Removal is a single atomic operation, so whichever path loses
//! the race observes a miss and must not touch the response handle.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use relay_common::{Result, TunnelError, TunnelResponse};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What the waiting HTTP handler receives, exactly once per id
#[derive(Debug)]
pub enum RequestOutcome {
    /// The client answered in time
    Completed(TunnelResponse),
    /// The deadline fired first
    TimedOut,
}

struct PendingEntry {
    responder: oneshot::Sender<RequestOutcome>,
    timer: Option<JoinHandle<()>>,
}

/// In-flight request map with one cancellable deadline task per entry
#[derive(Default)]
pub struct RequestCorrelator {
    pending: Arc<DashMap<String, PendingEntry>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the pending entry and arm its deadline. The timer goes through
    /// the same atomic removal as `complete`, so at most one outcome is ever
    /// delivered for an id.
    pub fn register(
        &self,
        id: String,
        responder: oneshot::Sender<RequestOutcome>,
        timeout: Duration,
    ) {
        self.pending.insert(
            id.clone(),
            PendingEntry {
                responder,
                timer: None,
            },
        );

        let pending = Arc::clone(&self.pending);
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, entry)) = pending.remove(&timer_id) {
                let _ = entry.responder.send(RequestOutcome::TimedOut);
            }
        });

        match self.pending.get_mut(&id) {
            Some(mut entry) => entry.timer = Some(timer),
            // completed before the timer was armed
            None => timer.abort(),
        }
    }

    /// Atomically remove the entry and deliver the response. A miss means
    /// the request already timed out (or was never registered); the caller
    /// must not touch anything in that case.
    pub fn complete(&self, id: &str, response: TunnelResponse) -> Result<()> {
        let (_, entry) = self
            .pending
            .remove(id)
            .ok_or_else(|| TunnelError::RequestNotFound(id.to_string()))?;

        if let Some(timer) = entry.timer {
            timer.abort();
        }
        let _ = entry.responder.send(RequestOutcome::Completed(response));
        Ok(())
    }

    /// Drop a pending entry without delivering an outcome. Used when the
    /// dispatch itself fails after registration.
    pub fn discard(&self, id: &str) {
        if let Some((_, entry)) = self.pending.remove(id) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
