//! Validation for client-supplied subdomain names
//!
//! Requested names come straight off the wire from unauthenticated-until-now
//! peers, so anything outside the DNS-label shape is rejected before it can
//! reach the registry or the logs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TunnelError};

/// DNS-label shape: 3-63 chars, lowercase alphanumeric plus inner hyphens
static SUBDOMAIN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").unwrap());

/// Validate a requested subdomain and return its normalized form.
///
/// The candidate is trimmed and lowercased before matching, so `MyApp `
/// normalizes to `myapp`. Anything that does not match the label shape
/// after normalization is an error.
pub fn validate_subdomain(candidate: &str) -> Result<String> {
    let normalized = candidate.trim().to_lowercase();

    if !SUBDOMAIN_REGEX.is_match(&normalized) {
        return Err(TunnelError::InvalidSubdomain);
    }

    Ok(normalized)
}
