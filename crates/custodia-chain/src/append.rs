//! The append engine: the chain's single write path.
//!
//! Every auditable event in the surrounding application enters the chain
//! through `AppendEngine::append` and nothing else inserts entries.  The
//! engine resolves the active secret, reads the chain tail, assigns the next
//! sequence, stamps a server-side timestamp, computes the keyed digest, and
//! persists — all under an internal mutex, so the read-tail / hash / write
//! sequence can never interleave with another append and fork the chain.
//!
//! The SQLite backend additionally keys entries by `sequence_id` at the
//! schema level, so even two engines racing on one database surface a
//! `Persistence` error instead of two entries claiming the same predecessor.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::info;

use custodia_contracts::{
    entry::{AppendRequest, ChainEntry, GENESIS_HASH},
    error::{CustodiaError, CustodiaResult},
};
use custodia_core::{ChainStore, SecretStore};

use crate::hasher::{compute_entry_hash, truncate_to_micros};

/// The single logical writer for one audit chain.
///
/// # Concurrency
///
/// `append` serializes internally; multiple threads may share one engine
/// through an `Arc` without additional locking.  Verification reads the
/// store directly and takes no part in this lock.
pub struct AppendEngine {
    chain: Arc<dyn ChainStore>,
    secrets: Arc<dyn SecretStore>,
    write_lock: Mutex<()>,
}

impl AppendEngine {
    /// Create an engine over the given stores.
    pub fn new(chain: Arc<dyn ChainStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            chain,
            secrets,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one audit fact and return its assigned sequence.
    ///
    /// When the request carries an idempotency key that was already used,
    /// the originally assigned sequence is returned and nothing is written —
    /// this makes caller-side retry after an ambiguous failure safe.
    ///
    /// # Errors
    ///
    /// `Configuration` when no active secret is registered; `Persistence`
    /// when the store write fails.  The entry is never partially written:
    /// the digest is computed before the single store insert.
    pub fn append(&self, request: AppendRequest) -> CustodiaResult<u64> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| CustodiaError::Persistence {
                reason: format!("append lock poisoned: {e}"),
            })?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.chain.find_idempotent(key)? {
                info!(
                    sequence_id = existing,
                    idempotency_key = %key,
                    "append replayed; returning original sequence"
                );
                return Ok(existing);
            }
        }

        let active = self.secrets.active()?;

        let (sequence_id, previous_hash) = match self.chain.tail()? {
            Some((tail_sequence, tail_hash)) => (tail_sequence + 1, tail_hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        // Server-side capture: callers never supply the timestamp, so events
        // cannot be backdated.  Truncated to microseconds to match the
        // canonical rendering folded into the digest.
        let timestamp = truncate_to_micros(Utc::now());

        let hash = compute_entry_hash(
            &previous_hash,
            &request.actor_id,
            &request.action,
            &request.resource_type,
            &request.resource_id,
            &request.details,
            &timestamp,
            &active.secret,
        )?;

        let entry = ChainEntry {
            sequence_id,
            previous_hash,
            actor_id: request.actor_id,
            action: request.action,
            resource_type: request.resource_type,
            resource_id: request.resource_id,
            details: request.details,
            timestamp,
            key_version: active.version,
            hash,
            idempotency_key: request.idempotency_key,
        };

        self.chain.append(&entry)?;

        info!(
            sequence_id,
            actor_id = %entry.actor_id,
            action = %entry.action,
            key_version = active.version,
            "audit entry appended"
        );

        Ok(sequence_id)
    }
}
