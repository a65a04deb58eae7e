//! Core trait definitions for the CUSTODIA audit chain.
//!
//! These three traits define the complete storage trust boundary:
//!
//! - `ChainStore`  — the ordered, append-only home of chain entries
//! - `SecretStore` — versioned key material for the chain hasher
//! - `RunStore`    — the immutable history of verification passes
//!
//! The append engine and verifier are written against these seams only, so
//! a fake store can be injected in tests and the SQLite backend can be
//! swapped for a managed database without touching the chain logic.

use uuid::Uuid;

use custodia_contracts::{
    entry::ChainEntry,
    error::CustodiaResult,
    query::EntryFilter,
    report::VerificationRun,
    secret::SecretVersion,
};

/// The ordered, append-only store of chain entries.
///
/// Implementations must treat rows as immutable once written: no update, no
/// delete.  The storage layer enforces that where it can (permissions,
/// triggers); the verifier assumes a tamperer may bypass it anyway and is
/// the last line of defense.
pub trait ChainStore: Send + Sync {
    /// Persist one new entry.
    ///
    /// Must reject an entry whose `sequence_id` already exists or does not
    /// extend the current tail — a conflicting write is a `Persistence`
    /// error, never a silent fork of the chain.
    fn append(&self, entry: &ChainEntry) -> CustodiaResult<()>;

    /// The `(sequence_id, hash)` of the newest entry, or `None` for an
    /// empty chain.
    fn tail(&self) -> CustodiaResult<Option<(u64, String)>>;

    /// Up to `limit` entries with `sequence_id` greater than `after`,
    /// ascending.  `after = None` starts from the beginning.  This is the
    /// batched read path the verifier streams from, so implementations
    /// must not require loading the whole chain.
    fn scan(&self, after: Option<u64>, limit: usize) -> CustodiaResult<Vec<ChainEntry>>;

    /// Total number of persisted entries.
    fn count(&self) -> CustodiaResult<u64>;

    /// The sequence previously assigned to this idempotency key, if any.
    fn find_idempotent(&self, key: &Uuid) -> CustodiaResult<Option<u64>>;

    /// Entries matching the filter, newest first, capped by the filter's
    /// limit.  Read-only operational path; never consulted by the
    /// verifier.
    fn query(&self, filter: &EntryFilter) -> CustodiaResult<Vec<ChainEntry>>;
}

/// Versioned key material for the chain hasher.
///
/// Append-only at the secret layer: rotation adds a version and moves the
/// active pointer, and prior versions stay retrievable forever so
/// historical entries can always be re-keyed for verification.
pub trait SecretStore: Send + Sync {
    /// The currently active version, used for new appends.
    ///
    /// Fails with `Configuration` when no version has been registered yet.
    fn active(&self) -> CustodiaResult<SecretVersion>;

    /// The secret for a specific historical version.
    ///
    /// Fails with `MissingKeyVersion` when that version is absent — an
    /// operational retention failure, reported distinctly from tampering.
    fn secret_for(&self, version: u32) -> CustodiaResult<SecretVersion>;

    /// Register `secret` as the next version (current max + 1) and make it
    /// active.  The insert and the pointer move are atomic; a concurrent
    /// rotation colliding on the version number is a `Configuration`
    /// error the operator retries.
    fn rotate(&self, secret: &str) -> CustodiaResult<u32>;
}

/// The immutable history of verification passes.
pub trait RunStore: Send + Sync {
    /// Persist one run record.  Rows are never updated or deleted.
    fn record(&self, run: &VerificationRun) -> CustodiaResult<()>;

    /// Up to `limit` runs, newest first.
    fn recent(&self, limit: usize) -> CustodiaResult<Vec<VerificationRun>>;
}
