//! # custodia-contracts
//!
//! Shared types, reports, and the error taxonomy for the CUSTODIA audit
//! chain.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions and error types.

pub mod entry;
pub mod error;
pub mod query;
pub mod report;
pub mod secret;

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use super::entry::{AppendRequest, ChainEntry, GENESIS_HASH};
    use super::error::CustodiaError;
    use super::query::EntryFilter;
    use super::report::{BreakKind, ChainBreak, VerificationReport};
    use super::secret::{validate_secret, SecretVersion};

    fn sample_entry(sequence_id: u64, action: &str) -> ChainEntry {
        ChainEntry {
            sequence_id,
            previous_hash: GENESIS_HASH.to_string(),
            actor_id: "clinician-7".to_string(),
            action: action.to_string(),
            resource_type: "client_file".to_string(),
            resource_id: "cf-001".to_string(),
            details: json!({ "reason": "treatment_planning" }),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            key_version: 1,
            hash: "ab".repeat(32),
            idempotency_key: None,
        }
    }

    // ── Error display messages ───────────────────────────────────────────────

    #[test]
    fn error_configuration_display() {
        let err = CustodiaError::Configuration {
            reason: "signing secret is empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("signing secret is empty"));
    }

    #[test]
    fn error_persistence_display() {
        let err = CustodiaError::Persistence {
            reason: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("persistence error"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn error_missing_key_version_display() {
        let err = CustodiaError::MissingKeyVersion { version: 3 };
        let msg = err.to_string();
        assert!(msg.contains("secret version 3"));
        assert!(msg.contains("not available"));
    }

    // ── VerificationReport construction and serde ────────────────────────────

    #[test]
    fn report_intact_has_no_break_fields() {
        let report = VerificationReport::intact(12, 12);
        assert!(report.intact);
        assert_eq!(report.total_entries, 12);
        assert_eq!(report.verified_entries, 12);
        assert!(report.broken_at_sequence_id.is_none());
        assert!(report.first_break().is_none());
    }

    #[test]
    fn report_broken_mirrors_first_break() {
        let breaks = vec![
            ChainBreak {
                sequence_id: 4,
                kind: BreakKind::HashMismatch,
                expected: "expected-digest".to_string(),
                actual: "stored-digest".to_string(),
            },
            ChainBreak {
                sequence_id: 9,
                kind: BreakKind::LinkMismatch,
                expected: "e2".to_string(),
                actual: "a2".to_string(),
            },
        ];
        let report = VerificationReport::broken(10, 3, breaks);

        assert!(!report.intact);
        assert_eq!(report.broken_at_sequence_id, Some(4));
        assert_eq!(report.expected_hash.as_deref(), Some("expected-digest"));
        assert_eq!(report.actual_hash.as_deref(), Some("stored-digest"));
        assert_eq!(report.breaks.len(), 2);
    }

    #[test]
    fn report_round_trips_through_json() {
        let original = VerificationReport::broken(
            5,
            2,
            vec![ChainBreak {
                sequence_id: 3,
                kind: BreakKind::SequenceGap,
                expected: "3".to_string(),
                actual: "5".to_string(),
            }],
        );
        let json = serde_json::to_string(&original).unwrap();
        let decoded: VerificationReport = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.intact, original.intact);
        assert_eq!(decoded.broken_at_sequence_id, Some(3));
        assert_eq!(decoded.breaks[0].kind, BreakKind::SequenceGap);
    }

    #[test]
    fn intact_report_json_omits_optional_fields() {
        let json = serde_json::to_string(&VerificationReport::intact(0, 0)).unwrap();
        assert!(!json.contains("broken_at_sequence_id"));
        assert!(!json.contains("expected_hash"));
        assert!(!json.contains("breaks"));
    }

    // ── AppendRequest builder ────────────────────────────────────────────────

    #[test]
    fn append_request_defaults_to_empty_details() {
        let req = AppendRequest::new("actor", "CREATE", "note", "n-1");
        assert_eq!(req.details, json!({}));
        assert!(req.idempotency_key.is_none());
    }

    #[test]
    fn append_request_builder_attaches_details_and_key() {
        let key = Uuid::new_v4();
        let req = AppendRequest::new("actor", "CREATE", "note", "n-1")
            .with_details(json!({ "x": 1 }))
            .with_idempotency_key(key);
        assert_eq!(req.details, json!({ "x": 1 }));
        assert_eq!(req.idempotency_key, Some(key));
    }

    // ── EntryFilter matching ─────────────────────────────────────────────────

    #[test]
    fn filter_matches_on_action() {
        let entry = sample_entry(1, "phi_accessed");
        let hit = EntryFilter {
            action: Some("phi_accessed".to_string()),
            ..Default::default()
        };
        let miss = EntryFilter {
            action: Some("consent_revoked".to_string()),
            ..Default::default()
        };
        assert!(hit.matches(&entry));
        assert!(!miss.matches(&entry));
    }

    #[test]
    fn filter_bounds_are_inclusive() {
        let entry = sample_entry(1, "phi_accessed");
        let filter = EntryFilter {
            since: Some(entry.timestamp),
            until: Some(entry.timestamp),
            ..Default::default()
        };
        assert!(filter.matches(&entry));

        let excluded = EntryFilter {
            since: Some(entry.timestamp + chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!excluded.matches(&entry));
    }

    // ── Secret validation and redaction ──────────────────────────────────────

    #[test]
    fn validate_secret_rejects_empty_and_placeholders() {
        assert!(validate_secret("").is_err());
        assert!(validate_secret("   ").is_err());
        assert!(validate_secret("changeme").is_err());
        assert!(validate_secret("ChangeMe").is_err());
        assert!(validate_secret("dev-secret").is_err());
    }

    #[test]
    fn validate_secret_accepts_real_material() {
        assert!(validate_secret("9f2c-long-random-operator-issued-key").is_ok());
    }

    #[test]
    fn secret_version_debug_redacts_material() {
        let version = SecretVersion {
            version: 2,
            secret: "super-sensitive-key".to_string(),
            created_at: Utc::now(),
        };
        let debug = format!("{version:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("super-sensitive-key"));
    }

    // ── ChainEntry serde ─────────────────────────────────────────────────────

    #[test]
    fn entry_round_trips_through_json() {
        let original = sample_entry(7, "disclosure_recorded");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ChainEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.sequence_id, 7);
        assert_eq!(decoded.action, "disclosure_recorded");
        assert_eq!(decoded.previous_hash, GENESIS_HASH);
        assert_eq!(decoded.details, original.details);
        assert_eq!(decoded.timestamp, original.timestamp);
    }
}
