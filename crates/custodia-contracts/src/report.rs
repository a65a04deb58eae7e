//! Verification outcomes.
//!
//! `VerificationReport` is what one verifier pass returns to its caller —
//! structured, JSON-serializable data in which a broken chain is a normal,
//! first-class outcome (`intact = false`), never an error.
//! `VerificationRun` is the immutable historical record of one pass,
//! persisted by the run recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of mismatch the verifier found at one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The recomputed digest differs from the stored `hash` — the entry's
    /// content was altered, or its digest was forged.
    HashMismatch,

    /// The stored `previous_hash` does not match the running chain — an
    /// entry was removed, reordered, or re-linked.
    LinkMismatch,

    /// The `sequence_id` is not the successor of the previous entry's.
    /// Gaps and reordering in the sequence are themselves tamper signals.
    SequenceGap,
}

/// One detected break, with the forensic pair of values that disagreed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBreak {
    /// The entry at which the break was detected.
    pub sequence_id: u64,
    pub kind: BreakKind,
    /// What the verifier computed or expected from the running chain.
    pub expected: String,
    /// What the store actually holds.
    pub actual: String,
}

/// The outcome of one verification pass.
///
/// `intact = false` carries the first break in the three `broken_*` /
/// `expected_hash` / `actual_hash` fields for operators, and the full
/// catalog in `breaks` when the verifier ran in collect-all mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True when every scanned entry verified cleanly.
    pub intact: bool,

    /// How many entries the chain held when the pass started.
    pub total_entries: u64,

    /// How many entries verified cleanly during the pass — equal to
    /// `total_entries` for an intact full pass, the count before the first
    /// break for a default (stop-at-first) pass, and possibly smaller than
    /// `total_entries` when the pass was bounded by a max-entries limit.
    pub verified_entries: u64,

    /// Sequence of the first broken entry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at_sequence_id: Option<u64>,

    /// The digest the verifier recomputed (or the linkage it expected) at
    /// the first break.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<String>,

    /// The value actually stored at the first break.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<String>,

    /// Every detected break, in chain order.  Holds exactly one element
    /// after a default (stop-at-first) pass that found a break; may hold
    /// several after a collect-all pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaks: Vec<ChainBreak>,
}

impl VerificationReport {
    /// Build the report for a pass that found no breaks.
    pub fn intact(total_entries: u64, verified_entries: u64) -> Self {
        Self {
            intact: true,
            total_entries,
            verified_entries,
            broken_at_sequence_id: None,
            expected_hash: None,
            actual_hash: None,
            breaks: Vec::new(),
        }
    }

    /// Build the report for a pass that detected one or more breaks.
    ///
    /// The first break is mirrored into the flat forensic fields.
    pub fn broken(total_entries: u64, verified_entries: u64, breaks: Vec<ChainBreak>) -> Self {
        let first = breaks.first();
        Self {
            intact: false,
            total_entries,
            verified_entries,
            broken_at_sequence_id: first.map(|b| b.sequence_id),
            expected_hash: first.map(|b| b.expected.clone()),
            actual_hash: first.map(|b| b.actual.clone()),
            breaks,
        }
    }

    /// The first detected break, if any.
    pub fn first_break(&self) -> Option<&ChainBreak> {
        self.breaks.first()
    }
}

/// The persisted record of one verification pass.
///
/// Written by the run recorder after every pass, intact or broken, so the
/// verification history itself can be monitored.  Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRun {
    pub run_id: Uuid,
    pub run_at: DateTime<Utc>,
    pub intact: bool,
    pub total_entries: u64,
    pub verified_entries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at_sequence_id: Option<u64>,

    /// JSON blob with the expected/actual pair and break kind at the first
    /// break, absent for intact runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
