//! Operational query and export types.
//!
//! These serve the read-only tooling path: listing recent entries for an
//! operator and producing a date-bounded compliance export.  Neither touches
//! the chain's integrity machinery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::ChainEntry;

/// Filter for listing or exporting chain entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Restrict to entries with exactly this action label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Inclusive lower bound on `timestamp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `timestamp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,

    /// Maximum number of entries to return.  `None` means no cap, which
    /// listings should avoid but exports may use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl EntryFilter {
    /// True when the entry passes the action and timestamp bounds.
    ///
    /// The limit is applied by the store, not here.
    pub fn matches(&self, entry: &ChainEntry) -> bool {
        if let Some(action) = &self.action {
            if entry.action != *action {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// A structured compliance export of a bounded slice of the chain.
///
/// Serialized as a single JSON document; entries appear in chain order so
/// the export itself can be re-verified against the live chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    /// When the export was produced.
    pub exported_at: DateTime<Utc>,

    /// The filter that selected the entries.
    pub filter: EntryFilter,

    /// Number of entries in the export.
    pub entry_count: usize,

    /// The selected entries, ascending by `sequence_id`.
    pub entries: Vec<ChainEntry>,
}

impl AuditExport {
    /// Wrap the selected entries with the export metadata.
    pub fn new(filter: EntryFilter, entries: Vec<ChainEntry>) -> Self {
        Self {
            exported_at: Utc::now(),
            entry_count: entries.len(),
            filter,
            entries,
        }
    }
}
