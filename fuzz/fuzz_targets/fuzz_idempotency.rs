//! Fuzz testing for idempotency key derivation and header parsing.
//!
//! Ensures that for arbitrary input:
//!
//! - Key derivation never panics and always yields a UUID-shaped key
//! - The same body and URL always yield the same key
//! - Header parsing returns an error instead of panicking
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_idempotency -- -max_total_time=60
//! ```

#![no_main]

use api_connector::client::helpers::{parse_header_name, parse_header_value};
use api_connector::idempotency_key_from;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Split into a body part and a URL part at the first newline
    let (body, url) = s.split_once('\n').unwrap_or((s, "/"));

    let string_body = Value::String(body.to_string());
    let key = idempotency_key_from(Some(&string_body), url);
    assert_eq!(key.len(), 36);
    assert_eq!(key.as_bytes()[14], b'4');
    assert_eq!(key, idempotency_key_from(Some(&string_body), url));

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let _ = idempotency_key_from(Some(&json), url);
    }
    let _ = idempotency_key_from(None, url);

    let _ = parse_header_name(body);
    let _ = parse_header_value(url, body);
});
