//! Deterministic idempotency keys.
//!
//! A key is derived from the serialized request body followed by the request
//! URL, hashed with a 128-bit cyrb-style string hash over UTF-16 code units,
//! and laid out in the familiar UUID shape:
//!
//! ```text
//! body (JSON, or raw string) ──┐
//!                              ├─► utf-16 units ─► cyrb128 ─► 32 hex chars ─► xxxxxxxx-xxxx-4xxx-xxxx-xxxxxxxxxxxx
//! url ─────────────────────────┘
//! ```
//!
//! The result is deterministic: the same body and URL always produce the same
//! key. The version nibble is always `4`; the variant nibble is whatever the
//! hash yields, so keys are UUID-shaped but not RFC 4122 conformant.

use serde_json::Value;

/// Text hashed in place of an absent body.
const ABSENT_BODY: &str = "undefined";

const KEY_TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-xxxx-xxxxxxxxxxxx";

/// Derive the idempotency key for a request body and URL.
pub fn idempotency_key_from(body: Option<&Value>, url: &str) -> String {
    let mut input = serialize_body(body);
    input.push_str(url);
    format_key(&cyrb128_hex(&input))
}

/// Strings are hashed verbatim, every other value as compact JSON.
fn serialize_body(body: Option<&Value>) -> String {
    match body {
        None => ABSENT_BODY.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// 128-bit hash rendered as 32 lowercase hex characters (h4, h3, h2, h1).
fn cyrb128_hex(input: &str) -> String {
    let mut h1: u32 = 0xdead_beef;
    let mut h2: u32 = 0x41c6_ce57;
    let mut h3: u32 = 0xfead_cabe;
    let mut h4: u32 = 0x93a5_f713;

    for unit in input.encode_utf16() {
        let k = u32::from(unit);
        h1 = (h1 ^ k).wrapping_mul(2_654_435_761);
        h2 = (h2 ^ k).wrapping_mul(1_597_334_677);
        h3 = (h3 ^ k).wrapping_mul(1_459_886_047);
        h4 = (h4 ^ k).wrapping_mul(3_367_900_313);
    }

    h1 = (h1 ^ (h1 >> 16)).wrapping_mul(2_246_822_507)
        ^ (h2 ^ (h2 >> 13)).wrapping_mul(3_266_489_909);
    h2 = (h2 ^ (h2 >> 16)).wrapping_mul(2_246_822_507)
        ^ (h1 ^ (h1 >> 13)).wrapping_mul(3_266_489_909);
    h3 = (h3 ^ (h3 >> 16)).wrapping_mul(1_500_450_271)
        ^ (h4 ^ (h4 >> 13)).wrapping_mul(986_956_175);
    h4 = (h4 ^ (h4 >> 16)).wrapping_mul(1_500_450_271)
        ^ (h3 ^ (h3 >> 13)).wrapping_mul(986_956_175);

    format!("{h4:08x}{h3:08x}{h2:08x}{h1:08x}")
}

/// Each `x` at template position `p` takes hash character `p % 32`.
fn format_key(hash: &str) -> String {
    let hash = hash.as_bytes();
    KEY_TEMPLATE
        .char_indices()
        .map(|(position, c)| match (c, hash.get(position % hash.len().max(1))) {
            ('x', Some(&h)) => char::from(h),
            _ => c,
        })
        .collect()
}
