//! The verification-run recorder.
//!
//! Persists the outcome of each verifier pass as an immutable
//! `VerificationRun` row so the verification history itself can be
//! monitored: when did the last pass run, has the chain ever failed, where.
//! Pure field mapping — no business logic beyond serializing the forensic
//! pair at the break into the details blob.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use custodia_contracts::{
    error::CustodiaResult,
    report::{VerificationReport, VerificationRun},
};
use custodia_core::RunStore;

/// Records verifier outcomes into a `RunStore`.
pub struct RunRecorder {
    runs: Arc<dyn RunStore>,
}

impl RunRecorder {
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self { runs }
    }

    /// Persist one report with a server-side timestamp and fresh run id.
    ///
    /// # Errors
    ///
    /// `Persistence` when the write fails.  Callers treat a failed
    /// recording as its own alert, separate from the verification result
    /// the report already carries.
    pub fn record(&self, report: &VerificationReport) -> CustodiaResult<VerificationRun> {
        let details = report.first_break().map(|b| {
            serde_json::json!({
                "kind": b.kind,
                "expected": b.expected,
                "actual": b.actual,
            })
            .to_string()
        });

        let run = VerificationRun {
            run_id: Uuid::new_v4(),
            run_at: Utc::now(),
            intact: report.intact,
            total_entries: report.total_entries,
            verified_entries: report.verified_entries,
            broken_at_sequence_id: report.broken_at_sequence_id,
            details,
        };

        self.runs.record(&run)?;

        info!(
            run_id = %run.run_id,
            intact = run.intact,
            verified_entries = run.verified_entries,
            "verification run recorded"
        );

        Ok(run)
    }
}
