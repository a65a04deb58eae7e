//! The chain verifier: a streaming, single-pass integrity walk.
//!
//! The verifier re-derives every entry's digest with the secret version
//! recorded on that entry and checks three things per entry, in order:
//!
//! 1. **Sequence continuity** — the `sequence_id` is the successor of the
//!    previous entry's.  Gaps mean rows were removed or reordered.
//! 2. **Prev-hash linkage** — the stored `previous_hash` equals the running
//!    chain digest (or the genesis sentinel for the first entry).
//! 3. **Digest correctness** — the digest recomputed over the entry's own
//!    fields and the running chain digest matches the stored `hash`.
//!
//! A mismatch is NOT an error: it is the expected, reportable outcome of a
//! tampering event, surfaced as `intact = false` in the report.  Only
//! infrastructure failures — an unreadable store, a key version missing
//! from the secret store — abort the walk with an `Err`.
//!
//! The walk reads the chain in pages and carries O(1) state across them, so
//! chains far larger than memory verify in one forward pass.

use std::sync::Arc;

use tracing::{debug, info, warn};

use custodia_contracts::{
    entry::{ChainEntry, GENESIS_HASH},
    error::CustodiaResult,
    report::{BreakKind, ChainBreak, VerificationReport},
};
use custodia_core::{ChainStore, SecretStore};

use custodia_chain::hasher::compute_entry_hash;

/// Tuning knobs for one verification pass.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// How many entries to fetch per store read.
    pub batch_size: usize,

    /// Stop after examining this many entries.  Supports bounded
    /// "verify up to N" operational runs over very large chains; the report
    /// then shows `verified_entries` smaller than `total_entries`.
    pub max_entries: Option<u64>,

    /// Continue past a break and catalog every subsequent one instead of
    /// stopping at the first.  After each break the walk re-anchors on the
    /// stored values, so independent tamper sites are all reported.
    pub report_all_breaks: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            max_entries: None,
            report_all_breaks: false,
        }
    }
}

/// The CUSTODIA chain verifier.
///
/// Read-only: verification never mutates the chain and may run concurrently
/// with appends — a pass is a point-in-time report and simply does not see
/// entries appended after it started its final page.
pub struct Verifier {
    chain: Arc<dyn ChainStore>,
    secrets: Arc<dyn SecretStore>,
    config: VerifierConfig,
}

impl Verifier {
    /// Create a verifier with the default configuration.
    pub fn new(chain: Arc<dyn ChainStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_config(chain, secrets, VerifierConfig::default())
    }

    /// Create a verifier with explicit tuning.
    pub fn with_config(
        chain: Arc<dyn ChainStore>,
        secrets: Arc<dyn SecretStore>,
        config: VerifierConfig,
    ) -> Self {
        Self {
            chain,
            secrets,
            config,
        }
    }

    /// Walk the chain and report its integrity.
    ///
    /// # Errors
    ///
    /// `Persistence` when the store cannot be read; `MissingKeyVersion`
    /// when an entry's recorded key version has no secret — an operational
    /// retention failure, deliberately distinct from a tamper report.
    pub fn verify(&self) -> CustodiaResult<VerificationReport> {
        let total_entries = self.chain.count()?;

        let mut expected_prev = GENESIS_HASH.to_string();
        let mut expected_sequence: Option<u64> = None;
        let mut verified: u64 = 0;
        let mut examined: u64 = 0;
        let mut breaks: Vec<ChainBreak> = Vec::new();
        let mut cursor: Option<u64> = None;

        'walk: loop {
            let batch = self.chain.scan(cursor, self.config.batch_size)?;
            if batch.is_empty() {
                break;
            }

            for entry in &batch {
                if let Some(limit) = self.config.max_entries {
                    if examined >= limit {
                        break 'walk;
                    }
                }
                examined += 1;

                match self.check_entry(entry, &expected_prev, expected_sequence)? {
                    None => {
                        verified += 1;
                    }
                    Some(found) => {
                        warn!(
                            sequence_id = found.sequence_id,
                            kind = ?found.kind,
                            "chain break detected"
                        );
                        breaks.push(found);
                        if !self.config.report_all_breaks {
                            break 'walk;
                        }
                        // Collect-all mode: re-anchor on the stored values so
                        // independent breaks further down are still found.
                    }
                }

                expected_prev = entry.hash.clone();
                expected_sequence = Some(entry.sequence_id + 1);
            }

            cursor = batch.last().map(|e| e.sequence_id);
        }

        let report = if breaks.is_empty() {
            debug!(total_entries, verified, "chain verified intact");
            VerificationReport::intact(total_entries, verified)
        } else {
            VerificationReport::broken(total_entries, verified, breaks)
        };

        info!(
            intact = report.intact,
            total_entries = report.total_entries,
            verified_entries = report.verified_entries,
            broken_at = ?report.broken_at_sequence_id,
            "verification pass complete"
        );

        Ok(report)
    }

    /// Check one entry against the running chain state.
    ///
    /// Returns `Ok(None)` when the entry is sound, `Ok(Some(break))` when
    /// it is a tamper signal, and `Err` only for infrastructure failures.
    fn check_entry(
        &self,
        entry: &ChainEntry,
        expected_prev: &str,
        expected_sequence: Option<u64>,
    ) -> CustodiaResult<Option<ChainBreak>> {
        // Rule 1: sequence continuity.  Only checkable from the second
        // entry on — the chain's starting sequence is whatever the first
        // entry carries.
        if let Some(expected) = expected_sequence {
            if entry.sequence_id != expected {
                return Ok(Some(ChainBreak {
                    sequence_id: entry.sequence_id,
                    kind: BreakKind::SequenceGap,
                    expected: expected.to_string(),
                    actual: entry.sequence_id.to_string(),
                }));
            }
        }

        // Rule 2: the stored prev_hash must match the running chain.
        if entry.previous_hash != expected_prev {
            return Ok(Some(ChainBreak {
                sequence_id: entry.sequence_id,
                kind: BreakKind::LinkMismatch,
                expected: expected_prev.to_string(),
                actual: entry.previous_hash.clone(),
            }));
        }

        // Resolve the secret this entry was signed with.  Absence is an
        // operational failure, not tampering, and aborts the walk.
        let secret = self.secrets.secret_for(entry.key_version)?;

        // Rule 3: recompute the digest over the running chain state.  Using
        // `expected_prev` rather than the stored field means a re-linked
        // entry cannot vouch for itself.
        let recomputed = compute_entry_hash(
            expected_prev,
            &entry.actor_id,
            &entry.action,
            &entry.resource_type,
            &entry.resource_id,
            &entry.details,
            &entry.timestamp,
            &secret.secret,
        )?;

        if entry.hash != recomputed {
            return Ok(Some(ChainBreak {
                sequence_id: entry.sequence_id,
                kind: BreakKind::HashMismatch,
                expected: recomputed,
                actual: entry.hash.clone(),
            }));
        }

        Ok(None)
    }
}
