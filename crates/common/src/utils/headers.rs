use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Headers stripped from a relayed response. The body may have been
/// re-encoded in transit, so any original framing/length information is
/// stale; the relay recomputes content-length from the decoded bytes.
const SCRUBBED_RESPONSE_HEADERS: [&str; 3] =
    ["content-encoding", "transfer-encoding", "content-length"];

/// Convert HTTP headers to the wire format.
/// Multiple values per header name are preserved.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in headers.iter() {
        let key = name.as_str().to_string();
        let val = value.to_str().unwrap_or("").to_string();

        map.entry(key).or_default().push(val);
    }

    map
}

/// Convert the wire header format back to an HTTP HeaderMap.
/// Names or values that are not valid HTTP are dropped.
pub fn map_to_headers(map: &HashMap<String, Vec<String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, values) in map.iter() {
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                }
            }
        }
    }

    headers
}

/// Drop the framing headers that must not survive a relayed response
pub fn scrub_response_headers(map: &HashMap<String, Vec<String>>) -> HashMap<String, Vec<String>> {
    map.iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !SCRUBBED_RESPONSE_HEADERS.contains(&lower.as_str())
        })
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect()
}
