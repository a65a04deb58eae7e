//! CUSTODIA — Tamper-Evident Audit Chain Operator CLI
//!
//! The single operational surface over the audit chain: appending entries,
//! verifying integrity, listing and exporting history, and rotating the
//! signing secret.
//!
//! Usage:
//!   custodia append --actor clinician-7 --action phi_accessed \
//!       --resource-type client_file --resource-id cf-001 --details '{"reason":"audit"}'
//!   custodia verify --all-breaks
//!   custodia export --since 2026-01-01T00:00:00Z --output q1-export.json
//!   custodia rotate-key --secret-file /run/secrets/audit-key
//!
//! Exit codes: 0 = chain intact / operation succeeded, 1 = chain broken
//! (tamper evidence — actionable), 2 = operational failure (store or key
//! problem — distinct from tamper).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use custodia_chain::AppendEngine;
use custodia_contracts::{
    entry::AppendRequest,
    error::{CustodiaError, CustodiaResult},
    query::{AuditExport, EntryFilter},
    report::{BreakKind, VerificationReport},
};
use custodia_core::{ChainStore, RunStore, SecretStore};
use custodia_store::SqliteStore;
use custodia_verify::{RunRecorder, Verifier, VerifierConfig};

mod config;

use config::CliConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// CUSTODIA — tamper-evident audit chain for regulated health data.
#[derive(Parser)]
#[command(
    name = "custodia",
    about = "Append-only, hash-chained audit trail with cryptographic verification",
    long_about = "Maintains an append-only audit chain in which every entry commits to its\n\
                  predecessor through a keyed digest, and verifies after the fact that no\n\
                  historical entry was inserted, deleted, or mutated."
)]
struct Cli {
    /// Path to the audit database (overrides the config file).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a TOML config file (default: ./custodia.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one audit entry and print its assigned sequence.
    Append {
        /// Principal that caused the event.
        #[arg(long)]
        actor: String,

        /// What happened, e.g. "phi_accessed" or "part2_consent_revoked".
        #[arg(long)]
        action: String,

        /// Kind of object acted upon.
        #[arg(long)]
        resource_type: String,

        /// Identity of the object acted upon.
        #[arg(long)]
        resource_id: String,

        /// Event-specific payload as a JSON object.
        #[arg(long, default_value = "{}")]
        details: String,

        /// Retry token: replaying with the same key returns the original
        /// sequence instead of appending twice.
        #[arg(long)]
        idempotency_key: Option<Uuid>,
    },

    /// Walk the chain and report its integrity.
    Verify {
        /// Verify at most this many entries (bounded operational run).
        #[arg(long)]
        max_entries: Option<u64>,

        /// Catalog every break instead of stopping at the first.
        #[arg(long)]
        all_breaks: bool,

        /// Entries fetched per store read.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip persisting the outcome as a verification run.
        #[arg(long)]
        no_record: bool,

        /// Print the raw report as JSON instead of the summary.
        #[arg(long)]
        json: bool,
    },

    /// List recent entries, newest first.
    Recent {
        /// Restrict to one action label.
        #[arg(long)]
        action: Option<String>,

        /// Inclusive lower timestamp bound (RFC 3339).
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,

        /// Inclusive upper timestamp bound (RFC 3339).
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Export a date-bounded range of entries as a JSON document.
    Export {
        /// Inclusive lower timestamp bound (RFC 3339).
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,

        /// Inclusive upper timestamp bound (RFC 3339).
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Register a new signing secret version and make it active.
    RotateKey {
        /// File containing the new key material (or set CUSTODIA_SECRET).
        #[arg(long)]
        secret_file: Option<PathBuf>,
    },

    /// List recent verification runs, newest first.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Structured logging; set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("custodia: {e}");
            2
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> CustodiaResult<i32> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let db_path = cli
        .db
        .or(config.db.clone())
        .unwrap_or_else(|| PathBuf::from("custodia.db"));

    let store = Arc::new(SqliteStore::open(&db_path)?);

    match cli.command {
        Command::Append {
            actor,
            action,
            resource_type,
            resource_id,
            details,
            idempotency_key,
        } => run_append(
            store,
            actor,
            action,
            resource_type,
            resource_id,
            &details,
            idempotency_key,
        ),
        Command::Verify {
            max_entries,
            all_breaks,
            batch_size,
            no_record,
            json,
        } => {
            let verifier_config = VerifierConfig {
                batch_size: batch_size
                    .or(config.verify.batch_size)
                    .unwrap_or_else(|| VerifierConfig::default().batch_size),
                max_entries,
                report_all_breaks: all_breaks
                    || config.verify.report_all_breaks.unwrap_or(false),
            };
            run_verify(store, verifier_config, no_record, json)
        }
        Command::Recent {
            action,
            since,
            until,
            limit,
        } => run_recent(store, action, since, until, limit),
        Command::Export {
            since,
            until,
            output,
        } => run_export(store, since, until, output),
        Command::RotateKey { secret_file } => run_rotate_key(store, secret_file),
        Command::History { limit } => run_history(store, limit),
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn run_append(
    store: Arc<SqliteStore>,
    actor: String,
    action: String,
    resource_type: String,
    resource_id: String,
    details: &str,
    idempotency_key: Option<Uuid>,
) -> CustodiaResult<i32> {
    let details: serde_json::Value =
        serde_json::from_str(details).map_err(|e| CustodiaError::Configuration {
            reason: format!("--details is not valid JSON: {e}"),
        })?;
    if !details.is_object() {
        return Err(CustodiaError::Configuration {
            reason: "--details must be a JSON object".to_string(),
        });
    }

    let mut request =
        AppendRequest::new(actor, action, resource_type, resource_id).with_details(details);
    if let Some(key) = idempotency_key {
        request = request.with_idempotency_key(key);
    }

    let engine = AppendEngine::new(store.clone(), store);
    let sequence = engine.append(request)?;
    println!("appended entry {sequence}");
    Ok(0)
}

fn run_verify(
    store: Arc<SqliteStore>,
    config: VerifierConfig,
    no_record: bool,
    json: bool,
) -> CustodiaResult<i32> {
    let verifier = Verifier::with_config(store.clone(), store.clone(), config);
    let report = verifier.verify()?;

    if !no_record {
        // A failed recording is its own alert; it must not mask or change
        // the verification outcome.
        if let Err(e) = RunRecorder::new(store).record(&report) {
            eprintln!("custodia: warning: failed to record verification run: {e}");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report).map_err(|e| {
            CustodiaError::Persistence {
                reason: format!("serialize report: {e}"),
            }
        })?);
    } else {
        print_report(&report);
    }

    Ok(if report.intact { 0 } else { 1 })
}

fn print_report(report: &VerificationReport) {
    if report.intact {
        println!(
            "chain intact — {}/{} entries verified",
            report.verified_entries, report.total_entries
        );
        return;
    }

    println!(
        "CHAIN BROKEN — tamper evidence at entry {} ({} of {} entries verified before the break)",
        report
            .broken_at_sequence_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string()),
        report.verified_entries,
        report.total_entries,
    );
    for b in &report.breaks {
        let label = match b.kind {
            BreakKind::HashMismatch => "digest mismatch",
            BreakKind::LinkMismatch => "previous-hash mismatch",
            BreakKind::SequenceGap => "sequence gap",
        };
        println!("  entry {}: {label}", b.sequence_id);
        println!("    expected: {}", b.expected);
        println!("    actual:   {}", b.actual);
    }
}

fn run_recent(
    store: Arc<SqliteStore>,
    action: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: usize,
) -> CustodiaResult<i32> {
    let entries = store.query(&EntryFilter {
        action,
        since,
        until,
        limit: Some(limit),
    })?;

    if entries.is_empty() {
        println!("no matching entries");
        return Ok(0);
    }

    for entry in entries {
        println!(
            "{:>8}  {}  {}  {}  {}/{}",
            entry.sequence_id,
            custodia_chain::canonical_timestamp(&entry.timestamp),
            entry.actor_id,
            entry.action,
            entry.resource_type,
            entry.resource_id,
        );
    }
    Ok(0)
}

fn run_export(
    store: Arc<SqliteStore>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    output: Option<PathBuf>,
) -> CustodiaResult<i32> {
    let filter = EntryFilter {
        action: None,
        since,
        until,
        limit: None,
    };

    let mut entries = store.query(&filter)?;
    // The query lists newest first for operators; the export document
    // carries chain order so it can be re-verified.
    entries.sort_by_key(|e| e.sequence_id);

    let export = AuditExport::new(filter, entries);
    let document =
        serde_json::to_string_pretty(&export).map_err(|e| CustodiaError::Persistence {
            reason: format!("serialize export: {e}"),
        })?;

    match output {
        Some(path) => {
            std::fs::write(&path, document).map_err(|e| CustodiaError::Persistence {
                reason: format!("write export to '{}': {e}", path.display()),
            })?;
            println!(
                "exported {} entries to {}",
                export.entry_count,
                path.display()
            );
        }
        None => println!("{document}"),
    }
    Ok(0)
}

fn run_rotate_key(store: Arc<SqliteStore>, secret_file: Option<PathBuf>) -> CustodiaResult<i32> {
    // Key material comes from a file or the environment, never from argv,
    // so it cannot leak through the process table or shell history.
    let secret = match secret_file {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| CustodiaError::Configuration {
            reason: format!("cannot read secret file '{}': {e}", path.display()),
        })?,
        None => std::env::var("CUSTODIA_SECRET").map_err(|_| CustodiaError::Configuration {
            reason: "provide --secret-file or set CUSTODIA_SECRET".to_string(),
        })?,
    };

    let version = store.rotate(secret.trim())?;
    println!("registered secret version {version} (now active)");
    Ok(0)
}

fn run_history(store: Arc<SqliteStore>, limit: usize) -> CustodiaResult<i32> {
    let runs = store.recent(limit)?;
    if runs.is_empty() {
        println!("no verification runs recorded");
        return Ok(0);
    }

    for run in runs {
        let outcome = if run.intact {
            "intact".to_string()
        } else {
            format!(
                "BROKEN at {}",
                run.broken_at_sequence_id
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )
        };
        println!(
            "{}  {}  {}  {}/{} verified",
            run.run_at.to_rfc3339(),
            run.run_id,
            outcome,
            run.verified_entries,
            run.total_entries,
        );
    }
    Ok(0)
}
