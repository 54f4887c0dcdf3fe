//! Subdomain allocation against the registry
//!
//! A requested name is validated and reserved as-is; without one, random
//! candidates are tried a bounded number of times. The bound trades a small
//! failure probability under a saturated name space for never looping.

use std::sync::Arc;

use relay_common::{
    Message, Result, TunnelError, constants::MAX_ALLOCATION_ATTEMPTS, generate_subdomain,
    validate_subdomain,
};
use tokio::sync::mpsc;

use crate::registry::{TunnelConnection, TunnelRegistry};

/// Reserve a subdomain for a freshly authenticated channel
pub fn allocate(
    registry: &TunnelRegistry,
    requested: Option<&str>,
    sender: &mpsc::Sender<Message>,
) -> Result<Arc<TunnelConnection>> {
    if let Some(requested) = requested {
        let subdomain = validate_subdomain(requested)?;
        return registry.reserve(TunnelConnection::new(subdomain, sender.clone()));
    }

    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let candidate = generate_subdomain();
        match registry.reserve(TunnelConnection::new(candidate, sender.clone())) {
            Ok(connection) => return Ok(connection),
            Err(TunnelError::SubdomainTaken(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(TunnelError::AllocationExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::Sender<Message> {
        // reservation does not require an open channel, so the receiver
        // side can be dropped straight away
        let (tx, _rx) = mpsc::channel(16);
        tx
    }

    #[test]
    fn test_allocate_requested() {
        let registry = TunnelRegistry::new();
        let conn = allocate(&registry, Some("myapp"), &sender()).unwrap();

        assert_eq!(conn.subdomain, "myapp");
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_allocate_requested_normalizes() {
        let registry = TunnelRegistry::new();
        let conn = allocate(&registry, Some("  MyApp "), &sender()).unwrap();
        assert_eq!(conn.subdomain, "myapp");
    }

    #[test]
    fn test_allocate_requested_invalid() {
        let registry = TunnelRegistry::new();
        let err = allocate(&registry, Some("-bad-"), &sender()).unwrap_err();

        assert!(matches!(err, TunnelError::InvalidSubdomain));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_allocate_requested_taken() {
        let registry = TunnelRegistry::new();
        allocate(&registry, Some("myapp"), &sender()).unwrap();

        let err = allocate(&registry, Some("myapp"), &sender()).unwrap_err();
        assert!(matches!(err, TunnelError::SubdomainTaken(name) if name == "myapp"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_allocate_random() {
        let registry = TunnelRegistry::new();
        let conn = allocate(&registry, None, &sender()).unwrap();

        assert!(validate_subdomain(&conn.subdomain).is_ok());
        assert_eq!(conn.subdomain.split('-').count(), 3);
        assert!(registry.lookup(&conn.subdomain).is_some());
    }

    #[test]
    fn test_allocate_random_avoids_collisions() {
        let registry = TunnelRegistry::new();
        for _ in 0..50 {
            allocate(&registry, None, &sender()).unwrap();
        }
        assert_eq!(registry.count(), 50);
    }
}
