use rand::{Rng, thread_rng};
use uuid::Uuid;

use crate::constants::SUBDOMAIN_WORDS;
use crate::words::WORDS;

/// Generate a human-memorable subdomain candidate.
/// Format: three random words joined with hyphens, e.g. "calm-river-stone".
/// Not guaranteed unique; the registry enforces uniqueness on reservation.
pub fn generate_subdomain() -> String {
    let mut rng = thread_rng();
    let words: Vec<&str> = (0..SUBDOMAIN_WORDS)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect();
    words.join("-")
}

/// Generate a correlation id: 128 bits as 32 lowercase hex characters
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}
