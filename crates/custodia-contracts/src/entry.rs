//! Chain entry types.
//!
//! `ChainEntry` is one immutable audit fact, linked to its predecessor by a
//! keyed digest.  `AppendRequest` is what callers hand to the append engine;
//! the engine fills in everything the caller must not control (sequence,
//! timestamp, key version, hashes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The sentinel `previous_hash` carried by the first entry in the chain.
///
/// An empty string can never be produced by the chain hasher, so genesis
/// detection is unambiguous.
pub const GENESIS_HASH: &str = "";

/// A single entry in the keyed hash chain.
///
/// Each entry commits to the one before it via `previous_hash`, forming an
/// append-only chain.  Modifying any hashed field — or removing a row —
/// invalidates `hash` or the linkage of the successor, which the verifier
/// detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Position in the chain.  Assigned at persistence time, starts at 1,
    /// strictly increasing with no gaps.
    pub sequence_id: u64,

    /// The `hash` of the immediately preceding entry, or [`GENESIS_HASH`]
    /// for the first entry.
    pub previous_hash: String,

    /// The principal that caused the event (opaque identifier).
    pub actor_id: String,

    /// Short label of what happened, e.g. `"part2_consent_revoked"`.
    pub action: String,

    /// The kind of object acted upon, e.g. `"client_file"`.
    pub resource_type: String,

    /// The identity of the object acted upon.
    pub resource_id: String,

    /// Event-specific structured payload.  Canonicalized (keys sorted at
    /// every level) before being folded into the digest, so key order never
    /// affects the hash.
    pub details: serde_json::Value,

    /// Event time, captured server-side and truncated to microseconds so
    /// the canonical RFC 3339 form round-trips exactly through storage.
    pub timestamp: DateTime<Utc>,

    /// Which secret-store version keyed this entry's digest.
    pub key_version: u32,

    /// Lowercase hex HMAC-SHA256 over the canonical serialization of all
    /// fields above (excluding `sequence_id` ordering metadata is implied
    /// by `previous_hash`; see the hasher's input layout).
    pub hash: String,

    /// Caller-supplied retry token.  Stored for duplicate suppression but
    /// excluded from the digest — it is delivery metadata, not an audit
    /// fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
}

/// The caller-facing input to one append operation.
///
/// Everything else on [`ChainEntry`] — sequence, timestamp, key version,
/// previous hash, digest — is assigned by the append engine so callers
/// cannot backdate or re-link entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub actor_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,

    /// Optional retry token.  Replaying an append with the same key returns
    /// the originally assigned sequence instead of writing a duplicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
}

impl AppendRequest {
    /// Build a request with an empty-object details payload.
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            details: serde_json::Value::Object(serde_json::Map::new()),
            idempotency_key: None,
        }
    }

    /// Attach a structured details payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Attach an idempotency key for safe caller-side retries.
    pub fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}
