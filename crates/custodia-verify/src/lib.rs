//! # custodia-verify
//!
//! The integrity half of the CUSTODIA audit chain: a streaming verifier
//! that re-derives every entry's keyed digest and reports the first (or
//! every) point where the persisted chain diverges from what was written,
//! and a recorder that persists each pass's outcome for monitoring.
//!
//! A broken chain is a *report*, not an error — the verifier only fails
//! hard on infrastructure problems: an unreadable store, or an entry whose
//! recorded key version is no longer retrievable.

pub mod engine;
pub mod recorder;

pub use engine::{Verifier, VerifierConfig};
pub use recorder::RunRecorder;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use custodia_chain::{AppendEngine, InMemoryChainStore, InMemoryRunStore, InMemorySecretStore};
    use custodia_contracts::{
        entry::AppendRequest,
        error::CustodiaError,
        report::BreakKind,
    };
    use custodia_core::{ChainStore, RunStore, SecretStore};

    use super::{RunRecorder, Verifier, VerifierConfig};

    const SECRET: &str = "verification-test-signing-key";

    // ── Helpers ───────────────────────────────────────────────────────────────

    struct Fixture {
        chain: Arc<InMemoryChainStore>,
        secrets: Arc<InMemorySecretStore>,
    }

    impl Fixture {
        fn verifier(&self) -> Verifier {
            Verifier::new(self.chain.clone(), self.secrets.clone())
        }

        fn verifier_with(&self, config: VerifierConfig) -> Verifier {
            Verifier::with_config(self.chain.clone(), self.secrets.clone(), config)
        }
    }

    /// Build a chain of `n` entries with distinguishable payloads.
    fn chain_of(n: usize) -> Fixture {
        let chain = Arc::new(InMemoryChainStore::new());
        let secrets = Arc::new(InMemorySecretStore::with_secret(SECRET).unwrap());
        let engine = AppendEngine::new(chain.clone(), secrets.clone());

        for i in 0..n {
            engine
                .append(
                    AppendRequest::new("clinician-7", "phi_accessed", "client_file", "cf-001")
                        .with_details(json!({ "step": i })),
                )
                .unwrap();
        }

        Fixture { chain, secrets }
    }

    // ── No false positives ────────────────────────────────────────────────────

    /// An untouched chain always verifies intact with every entry counted.
    #[test]
    fn test_untouched_chain_is_intact() {
        for n in [1, 2, 17, 100] {
            let fixture = chain_of(n);
            let report = fixture.verifier().verify().unwrap();

            assert!(report.intact, "chain of {n} must verify intact");
            assert_eq!(report.total_entries, n as u64);
            assert_eq!(report.verified_entries, n as u64);
            assert!(report.first_break().is_none());
        }
    }

    /// An empty chain is trivially intact.
    #[test]
    fn test_empty_chain_is_intact() {
        let fixture = chain_of(0);
        let report = fixture.verifier().verify().unwrap();

        assert!(report.intact);
        assert_eq!(report.total_entries, 0);
        assert_eq!(report.verified_entries, 0);
    }

    /// Paged walks produce the same result as a single-batch walk.
    #[test]
    fn test_batched_walk_matches_unbatched() {
        let fixture = chain_of(7);
        let paged = fixture
            .verifier_with(VerifierConfig {
                batch_size: 2,
                ..Default::default()
            })
            .verify()
            .unwrap();
        let whole = fixture.verifier().verify().unwrap();

        assert_eq!(paged.intact, whole.intact);
        assert_eq!(paged.verified_entries, whole.verified_entries);
        assert_eq!(paged.total_entries, whole.total_entries);
    }

    // ── Tamper detection ──────────────────────────────────────────────────────

    /// End-to-end: three linked entries verify intact, then mutating the
    /// middle entry's action breaks the chain at that entry with only the
    /// first counted as verified.
    #[test]
    fn test_three_entry_scenario() {
        let chain = Arc::new(InMemoryChainStore::new());
        let secrets = Arc::new(InMemorySecretStore::with_secret(SECRET).unwrap());
        let engine = AppendEngine::new(chain.clone(), secrets.clone());

        for details in [json!({ "x": 1 }), json!({ "y": 2 }), json!({ "z": 3 })] {
            engine
                .append(
                    AppendRequest::new("clinician-7", "phi_accessed", "client_file", "cf-001")
                        .with_details(details),
                )
                .unwrap();
        }

        let entries = chain.scan(None, 10).unwrap();
        assert_eq!(entries[0].previous_hash, "");
        assert_eq!(entries[1].previous_hash, entries[0].hash);
        assert_eq!(entries[2].previous_hash, entries[1].hash);

        let verifier = Verifier::new(chain.clone(), secrets.clone());
        let before = verifier.verify().unwrap();
        assert!(before.intact);
        assert_eq!(before.total_entries, 3);
        assert_eq!(before.verified_entries, 3);

        let tampered_sequence = entries[1].sequence_id;
        chain
            .tamper(|entries| entries[1].action = "note_exported".to_string())
            .unwrap();

        let after = verifier.verify().unwrap();
        assert!(!after.intact);
        assert_eq!(after.broken_at_sequence_id, Some(tampered_sequence));
        assert_eq!(after.verified_entries, 1);
    }

    /// Mutating a stored field breaks the chain at exactly that entry, with
    /// only the preceding entries counted as verified.
    #[test]
    fn test_value_mutation_detected_at_entry() {
        let fixture = chain_of(3);

        // Mutate B's action directly in storage, as a tamperer would.
        fixture
            .chain
            .tamper(|entries| entries[1].action = "note_deleted".to_string())
            .unwrap();

        let report = fixture.verifier().verify().unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(2));
        assert_eq!(report.verified_entries, 1, "only A verified before the break");
        assert_eq!(report.first_break().unwrap().kind, BreakKind::HashMismatch);
        assert!(report.expected_hash.is_some());
        assert_eq!(
            report.actual_hash.as_deref(),
            Some(report.first_break().unwrap().actual.as_str())
        );
    }

    /// Mutating the details payload is detected the same way.
    #[test]
    fn test_details_mutation_detected() {
        let fixture = chain_of(3);
        fixture
            .chain
            .tamper(|entries| entries[2].details = json!({ "step": 999 }))
            .unwrap();

        let report = fixture.verifier().verify().unwrap();
        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(3));
        assert_eq!(report.verified_entries, 2);
    }

    /// Deleting a middle entry is detected at the entry following the
    /// deletion, as a sequence gap.
    #[test]
    fn test_deletion_detected_at_successor() {
        let fixture = chain_of(4);
        fixture.chain.tamper(|entries| {
            entries.remove(1); // delete sequence 2
        }).unwrap();

        let report = fixture.verifier().verify().unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(3));
        assert_eq!(report.first_break().unwrap().kind, BreakKind::SequenceGap);
        assert_eq!(report.verified_entries, 1);
    }

    /// Forging an entry's digest (without the key) is detected at exactly
    /// that entry.
    #[test]
    fn test_hash_forgery_detected() {
        let fixture = chain_of(3);
        fixture
            .chain
            .tamper(|entries| entries[1].hash = "f".repeat(64))
            .unwrap();

        let report = fixture.verifier().verify().unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(2));
        assert_eq!(report.first_break().unwrap().kind, BreakKind::HashMismatch);
        assert_eq!(report.actual_hash.as_deref(), Some("f".repeat(64).as_str()));
    }

    /// A genesis entry whose previous hash is not the sentinel is a break
    /// at the first entry.
    #[test]
    fn test_genesis_link_tamper_detected() {
        let fixture = chain_of(2);
        fixture
            .chain
            .tamper(|entries| entries[0].previous_hash = "a".repeat(64))
            .unwrap();

        let report = fixture.verifier().verify().unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(1));
        assert_eq!(report.first_break().unwrap().kind, BreakKind::LinkMismatch);
        assert_eq!(report.verified_entries, 0);
    }

    /// Re-linking an entry to a different predecessor is a link mismatch.
    #[test]
    fn test_relink_detected() {
        let fixture = chain_of(3);
        fixture
            .chain
            .tamper(|entries| entries[2].previous_hash = entries[0].hash.clone())
            .unwrap();

        let report = fixture.verifier().verify().unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(3));
        assert_eq!(report.first_break().unwrap().kind, BreakKind::LinkMismatch);
    }

    // ── Key rotation ──────────────────────────────────────────────────────────

    /// Entries signed under an older key version still verify after a
    /// rotation, as long as the old version stays retrievable.
    #[test]
    fn test_rotation_continuity() {
        let fixture = chain_of(2);
        fixture.secrets.rotate("rotated-signing-key-02").unwrap();

        let engine = AppendEngine::new(fixture.chain.clone(), fixture.secrets.clone());
        engine
            .append(
                AppendRequest::new("clinician-9", "consent_granted", "consent", "c-88")
                    .with_details(json!({ "scope": "part2" })),
            )
            .unwrap();

        let report = fixture.verifier().verify().unwrap();
        assert!(report.intact);
        assert_eq!(report.verified_entries, 3);

        let entries = fixture.chain.scan(None, 10).unwrap();
        assert_eq!(entries[0].key_version, 1);
        assert_eq!(entries[2].key_version, 2);
    }

    /// Losing a historical key version blocks verification with a distinct
    /// operational error — never a false tamper report.
    #[test]
    fn test_missing_key_version_is_not_a_tamper_report() {
        let fixture = chain_of(2);
        fixture.secrets.rotate("rotated-signing-key-02").unwrap();
        fixture.secrets.remove_version(1).unwrap();

        let result = fixture.verifier().verify();
        assert!(matches!(
            result,
            Err(CustodiaError::MissingKeyVersion { version: 1 })
        ));
    }

    // ── Modes ─────────────────────────────────────────────────────────────────

    /// Collect-all mode catalogs independent tamper sites instead of
    /// stopping at the first.
    #[test]
    fn test_collect_all_breaks_finds_every_site() {
        let fixture = chain_of(6);
        fixture.chain.tamper(|entries| {
            entries[1].action = "tampered_one".to_string();
            entries[4].action = "tampered_two".to_string();
        }).unwrap();

        let report = fixture
            .verifier_with(VerifierConfig {
                report_all_breaks: true,
                ..Default::default()
            })
            .verify()
            .unwrap();

        assert!(!report.intact);
        assert_eq!(report.breaks.len(), 2);
        assert_eq!(report.breaks[0].sequence_id, 2);
        assert_eq!(report.breaks[1].sequence_id, 5);
        // The flat fields still point at the first break.
        assert_eq!(report.broken_at_sequence_id, Some(2));
    }

    /// A bounded pass reports its partial progress.
    #[test]
    fn test_max_entries_bounds_the_walk() {
        let fixture = chain_of(5);
        let report = fixture
            .verifier_with(VerifierConfig {
                max_entries: Some(3),
                ..Default::default()
            })
            .verify()
            .unwrap();

        assert!(report.intact, "no break found in the verified prefix");
        assert_eq!(report.total_entries, 5);
        assert_eq!(report.verified_entries, 3);
    }

    /// A break inside the bounded prefix is still reported.
    #[test]
    fn test_max_entries_still_detects_breaks() {
        let fixture = chain_of(5);
        fixture
            .chain
            .tamper(|entries| entries[1].action = "tampered".to_string())
            .unwrap();

        let report = fixture
            .verifier_with(VerifierConfig {
                max_entries: Some(3),
                ..Default::default()
            })
            .verify()
            .unwrap();

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(2));
    }

    // ── Run recorder ──────────────────────────────────────────────────────────

    /// An intact pass maps to a run row with no break details.
    #[test]
    fn test_recorder_persists_intact_run() {
        let fixture = chain_of(3);
        let report = fixture.verifier().verify().unwrap();

        let runs = Arc::new(InMemoryRunStore::new());
        let recorder = RunRecorder::new(runs.clone());
        let run = recorder.record(&report).unwrap();

        assert!(run.intact);
        assert_eq!(run.total_entries, 3);
        assert_eq!(run.verified_entries, 3);
        assert!(run.details.is_none());

        let history = runs.recent(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, run.run_id);
    }

    /// A broken pass maps to a run row carrying the forensic pair.
    #[test]
    fn test_recorder_persists_break_details() {
        let fixture = chain_of(3);
        fixture
            .chain
            .tamper(|entries| entries[1].action = "tampered".to_string())
            .unwrap();
        let report = fixture.verifier().verify().unwrap();

        let runs = Arc::new(InMemoryRunStore::new());
        let recorder = RunRecorder::new(runs.clone());
        let run = recorder.record(&report).unwrap();

        assert!(!run.intact);
        assert_eq!(run.broken_at_sequence_id, Some(2));

        let details = run.details.expect("broken run must carry details");
        let blob: serde_json::Value = serde_json::from_str(&details).unwrap();
        assert_eq!(blob["kind"], "hash_mismatch");
        assert_eq!(blob["actual"], report.actual_hash.unwrap());
    }

    /// Runs are listed newest first.
    #[test]
    fn test_run_history_order() {
        let fixture = chain_of(2);
        let runs = Arc::new(InMemoryRunStore::new());
        let recorder = RunRecorder::new(runs.clone());

        let first = recorder.record(&fixture.verifier().verify().unwrap()).unwrap();
        let second = recorder.record(&fixture.verifier().verify().unwrap()).unwrap();

        let history = runs.recent(10).unwrap();
        assert_eq!(history[0].run_id, second.run_id);
        assert_eq!(history[1].run_id, first.run_id);
    }
}
