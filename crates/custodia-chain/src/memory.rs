//! In-memory reference implementations of the store traits.
//!
//! These are the backends the tests and demos run against, and the template
//! for what a real backend must guarantee: append-only entry storage with
//! sequence continuity enforced at the store, an append-only secret layer
//! with an active-version pointer, and an immutable run history.
//!
//! All three keep their state behind a `Mutex`, so they are safe to share
//! across threads through an `Arc`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use custodia_contracts::{
    entry::ChainEntry,
    error::{CustodiaError, CustodiaResult},
    query::EntryFilter,
    report::VerificationRun,
    secret::{validate_secret, SecretVersion},
};
use custodia_core::{ChainStore, RunStore, SecretStore};

fn lock_err<T>(e: std::sync::PoisonError<T>) -> CustodiaError {
    CustodiaError::Persistence {
        reason: format!("store lock poisoned: {e}"),
    }
}

// ── Chain store ───────────────────────────────────────────────────────────────

/// An append-only, in-memory chain store.
#[derive(Default)]
pub struct InMemoryChainStore {
    entries: Mutex<Vec<ChainEntry>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct mutable access to the stored entries.
    ///
    /// Exists so integrity tests can simulate a tamperer who bypasses the
    /// append-only interface; production code never calls this.
    pub fn tamper<F>(&self, f: F) -> CustodiaResult<()>
    where
        F: FnOnce(&mut Vec<ChainEntry>),
    {
        let mut entries = self.entries.lock().map_err(lock_err)?;
        f(&mut entries);
        Ok(())
    }
}

impl ChainStore for InMemoryChainStore {
    fn append(&self, entry: &ChainEntry) -> CustodiaResult<()> {
        let mut entries = self.entries.lock().map_err(lock_err)?;

        let expected = entries.last().map(|e| e.sequence_id + 1).unwrap_or(1);
        if entry.sequence_id != expected {
            return Err(CustodiaError::Persistence {
                reason: format!(
                    "sequence conflict: expected {expected}, got {}",
                    entry.sequence_id
                ),
            });
        }

        entries.push(entry.clone());
        Ok(())
    }

    fn tail(&self) -> CustodiaResult<Option<(u64, String)>> {
        let entries = self.entries.lock().map_err(lock_err)?;
        Ok(entries.last().map(|e| (e.sequence_id, e.hash.clone())))
    }

    fn scan(&self, after: Option<u64>, limit: usize) -> CustodiaResult<Vec<ChainEntry>> {
        let entries = self.entries.lock().map_err(lock_err)?;
        let start = after.unwrap_or(0);
        Ok(entries
            .iter()
            .filter(|e| e.sequence_id > start)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> CustodiaResult<u64> {
        let entries = self.entries.lock().map_err(lock_err)?;
        Ok(entries.len() as u64)
    }

    fn find_idempotent(&self, key: &Uuid) -> CustodiaResult<Option<u64>> {
        let entries = self.entries.lock().map_err(lock_err)?;
        Ok(entries
            .iter()
            .find(|e| e.idempotency_key.as_ref() == Some(key))
            .map(|e| e.sequence_id))
    }

    fn query(&self, filter: &EntryFilter) -> CustodiaResult<Vec<ChainEntry>> {
        let entries = self.entries.lock().map_err(lock_err)?;
        let mut matched: Vec<ChainEntry> = entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Newest first, as the operational listing expects.  Sequence breaks
        // ties between entries written within the same microsecond.
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(b.sequence_id.cmp(&a.sequence_id))
        });
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

// ── Secret store ──────────────────────────────────────────────────────────────

struct SecretState {
    versions: BTreeMap<u32, SecretVersion>,
    active: Option<u32>,
}

/// An in-memory versioned secret store.
pub struct InMemorySecretStore {
    state: Mutex<SecretState>,
}

impl InMemorySecretStore {
    /// Create an empty store with no versions registered.
    ///
    /// `active()` fails until the first `rotate` call, which mirrors a
    /// deployment that has not been provisioned yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SecretState {
                versions: BTreeMap::new(),
                active: None,
            }),
        }
    }

    /// Create a store pre-provisioned with `secret` as version 1.
    pub fn with_secret(secret: impl Into<String>) -> CustodiaResult<Self> {
        let store = Self::new();
        store.rotate(&secret.into())?;
        Ok(store)
    }

    /// Drop a historical version from the store.
    ///
    /// Real deployments never delete secret versions; this hook exists so
    /// retention-failure drills can exercise the `MissingKeyVersion` path
    /// the verifier must report distinctly from tampering.
    pub fn remove_version(&self, version: u32) -> CustodiaResult<()> {
        let mut state = self.state.lock().map_err(lock_err)?;
        state.versions.remove(&version);
        Ok(())
    }
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for InMemorySecretStore {
    fn active(&self) -> CustodiaResult<SecretVersion> {
        let state = self.state.lock().map_err(lock_err)?;
        let version = state.active.ok_or_else(|| CustodiaError::Configuration {
            reason: "no active signing secret is registered".to_string(),
        })?;
        state
            .versions
            .get(&version)
            .cloned()
            .ok_or(CustodiaError::MissingKeyVersion { version })
    }

    fn secret_for(&self, version: u32) -> CustodiaResult<SecretVersion> {
        let state = self.state.lock().map_err(lock_err)?;
        state
            .versions
            .get(&version)
            .cloned()
            .ok_or(CustodiaError::MissingKeyVersion { version })
    }

    fn rotate(&self, secret: &str) -> CustodiaResult<u32> {
        validate_secret(secret)?;

        let mut state = self.state.lock().map_err(lock_err)?;
        let version = state.versions.keys().next_back().map(|v| v + 1).unwrap_or(1);
        state.versions.insert(
            version,
            SecretVersion {
                version,
                secret: secret.to_string(),
                created_at: Utc::now(),
            },
        );
        state.active = Some(version);
        Ok(version)
    }
}

// ── Run store ─────────────────────────────────────────────────────────────────

/// An in-memory verification-run history.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<Vec<VerificationRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn record(&self, run: &VerificationRun) -> CustodiaResult<()> {
        let mut runs = self.runs.lock().map_err(lock_err)?;
        runs.push(run.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> CustodiaResult<Vec<VerificationRun>> {
        let runs = self.runs.lock().map_err(lock_err)?;
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}
