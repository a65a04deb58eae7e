//! Chain-hash primitives: keyed digests over a canonical entry serialization.
//!
//! Every digest is an HMAC-SHA256 keyed with a versioned operator secret, so
//! nobody without the key can forge an entry that re-links the chain.  Every
//! field that contributes to an entry's hash is listed explicitly so nothing
//! is accidentally omitted.
//!
//! MAC input layout (each field folded in as an 8-byte little-endian length
//! prefix followed by the field's UTF-8 bytes, in order):
//!   1. previous_hash (empty string for the genesis entry)
//!   2. actor_id
//!   3. action
//!   4. resource_type
//!   5. resource_id
//!   6. canonical JSON of details (object keys sorted at every level)
//!   7. timestamp as RFC 3339 with exactly six fractional digits
//!
//! The length prefixes make the serialization unambiguous: no combination of
//! field values can produce the same byte stream as a different combination.

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use custodia_contracts::{
    error::{CustodiaError, CustodiaResult},
    secret::validate_secret,
};

type HmacSha256 = Hmac<Sha256>;

/// Compute the keyed digest for a single chain entry.
///
/// Returns a lowercase 64-character hex string.  Pure function: identical
/// inputs and secret always yield byte-identical output.
///
/// # Errors
///
/// Fails with `Configuration` when `secret` is empty or a known placeholder
/// value — the chain must never be keyed with a weak default.
#[allow(clippy::too_many_arguments)]
pub fn compute_entry_hash(
    previous_hash: &str,
    actor_id: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: &Value,
    timestamp: &DateTime<Utc>,
    secret: &str,
) -> CustodiaResult<String> {
    validate_secret(secret)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| CustodiaError::Configuration {
            reason: format!("signing secret rejected by HMAC: {e}"),
        })?;

    update_field(&mut mac, previous_hash);
    update_field(&mut mac, actor_id);
    update_field(&mut mac, action);
    update_field(&mut mac, resource_type);
    update_field(&mut mac, resource_id);
    update_field(&mut mac, &canonical_json(details));
    update_field(&mut mac, &canonical_timestamp(timestamp));

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Fold one field into the MAC as length prefix + bytes.
fn update_field(mac: &mut HmacSha256, field: &str) {
    mac.update(&(field.len() as u64).to_le_bytes());
    mac.update(field.as_bytes());
}

/// Serialize a JSON value with object keys sorted lexicographically at
/// every nesting level, compact separators, no trailing whitespace.
///
/// Two structurally equal objects serialize — and therefore hash — the same
/// regardless of insertion order.  This is load-bearing for hash stability:
/// the details payload routinely round-trips through systems that do not
/// preserve key order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(&String, &Value)> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key strings are escaped the same way serde_json escapes
                // them, so the canonical form is itself valid JSON.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single compact rendering.
        other => out.push_str(&other.to_string()),
    }
}

/// The canonical timestamp rendering folded into the digest: RFC 3339 with
/// exactly six fractional digits and a `Z` offset.
///
/// Matches the storage form, so an entry read back from any backend hashes
/// identically to the entry as written.
pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Truncate a timestamp to microsecond precision.
///
/// Applied once at capture time so the in-memory value and its canonical
/// rendering carry exactly the same instant.
pub fn truncate_to_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(timestamp.timestamp_micros()).unwrap_or(timestamp)
}
