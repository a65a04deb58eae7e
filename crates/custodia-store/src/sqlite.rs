//! SQLite-backed implementations of the CUSTODIA store traits.
//!
//! One database file holds the three audit tables: `chain_entries`,
//! `secret_versions` (with the single-row `active_secret` pointer), and
//! `verification_runs`.  All three audit tables carry UPDATE/DELETE triggers
//! that abort immediately — the storage-layer rendering of the append-only
//! contract.  A tamperer with direct database access can drop the triggers,
//! which is exactly why the verifier re-derives every digest instead of
//! trusting the store.
//!
//! Timestamps are stored as canonical RFC 3339 text (microsecond precision,
//! `Z` offset), the same rendering the chain hasher folds into digests, so
//! an entry read back from disk hashes identically to the entry as written.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use custodia_chain::hasher::canonical_timestamp;
use custodia_contracts::{
    entry::ChainEntry,
    error::{CustodiaError, CustodiaResult},
    query::EntryFilter,
    report::VerificationRun,
    secret::{validate_secret, SecretVersion},
};
use custodia_core::{ChainStore, RunStore, SecretStore};

/// Tables, indices, and the immutability triggers.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS chain_entries (
        sequence_id     INTEGER PRIMARY KEY,
        previous_hash   TEXT NOT NULL,
        actor_id        TEXT NOT NULL,
        action          TEXT NOT NULL,
        resource_type   TEXT NOT NULL,
        resource_id     TEXT NOT NULL,
        details         TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        key_version     INTEGER NOT NULL,
        hash            TEXT NOT NULL,
        idempotency_key TEXT UNIQUE
    );
    CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON chain_entries(timestamp);
    CREATE INDEX IF NOT EXISTS idx_entries_action ON chain_entries(action);

    CREATE TABLE IF NOT EXISTS secret_versions (
        version    INTEGER PRIMARY KEY,
        secret     TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS active_secret (
        id      INTEGER PRIMARY KEY CHECK (id = 1),
        version INTEGER NOT NULL REFERENCES secret_versions(version)
    );

    CREATE TABLE IF NOT EXISTS verification_runs (
        run_id                TEXT PRIMARY KEY,
        run_at                TEXT NOT NULL,
        intact                INTEGER NOT NULL,
        total_entries         INTEGER NOT NULL,
        verified_entries      INTEGER NOT NULL,
        broken_at_sequence_id INTEGER,
        details               TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_runs_run_at ON verification_runs(run_at);

    CREATE TRIGGER IF NOT EXISTS chain_entries_immutable_update
    BEFORE UPDATE ON chain_entries
    BEGIN SELECT RAISE(ABORT, 'chain entries are immutable'); END;
    CREATE TRIGGER IF NOT EXISTS chain_entries_immutable_delete
    BEFORE DELETE ON chain_entries
    BEGIN SELECT RAISE(ABORT, 'chain entries are immutable'); END;

    CREATE TRIGGER IF NOT EXISTS secret_versions_immutable_update
    BEFORE UPDATE ON secret_versions
    BEGIN SELECT RAISE(ABORT, 'secret versions are immutable'); END;
    CREATE TRIGGER IF NOT EXISTS secret_versions_immutable_delete
    BEFORE DELETE ON secret_versions
    BEGIN SELECT RAISE(ABORT, 'secret versions are immutable'); END;

    CREATE TRIGGER IF NOT EXISTS verification_runs_immutable_update
    BEFORE UPDATE ON verification_runs
    BEGIN SELECT RAISE(ABORT, 'verification runs are immutable'); END;
    CREATE TRIGGER IF NOT EXISTS verification_runs_immutable_delete
    BEFORE DELETE ON verification_runs
    BEGIN SELECT RAISE(ABORT, 'verification runs are immutable'); END;
";

const ENTRY_COLUMNS: &str = "sequence_id, previous_hash, actor_id, action, resource_type, \
                             resource_id, details, timestamp, key_version, hash, idempotency_key";

const RUN_COLUMNS: &str = "run_id, run_at, intact, total_entries, verified_entries, \
                           broken_at_sequence_id, details";

fn persistence(context: &str, e: impl std::fmt::Display) -> CustodiaError {
    CustodiaError::Persistence {
        reason: format!("{context}: {e}"),
    }
}

/// A SQLite database implementing all three store traits.
///
/// The connection is guarded by a `Mutex`, so one store can be shared across
/// threads through an `Arc` and handed to the append engine and verifier as
/// each of its trait objects.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the audit database at the given path.
    ///
    /// Enables WAL mode, creates the schema and triggers if absent.
    pub fn open(path: &Path) -> CustodiaResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| persistence(&format!("open database '{}'", path.display()), e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| persistence("set WAL mode", e))?;
        // Appends sit on a synchronous request path; bound how long a
        // locked database can stall them.
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| persistence("set busy timeout", e))?;
        Self::bootstrap(conn)
    }

    /// Open a fresh in-memory database (tests and drills).
    pub fn open_in_memory() -> CustodiaResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| persistence("open in-memory database", e))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> CustodiaResult<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| persistence("create schema", e))?;

        let tail: Option<i64> = conn
            .query_row("SELECT MAX(sequence_id) FROM chain_entries", [], |row| {
                row.get(0)
            })
            .map_err(|e| persistence("read chain tail", e))?;

        info!(tail_sequence = ?tail, "audit store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CustodiaResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| CustodiaError::Persistence {
            reason: format!("store lock poisoned: {e}"),
        })
    }

    #[cfg(test)]
    fn raw(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChainEntry> {
    let details_text: String = row.get(6)?;
    let details = serde_json::from_str(&details_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp_text: String = row.get(7)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let idempotency_key = row
        .get::<_, Option<String>>(10)?
        .map(|s| {
            Uuid::parse_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    Ok(ChainEntry {
        sequence_id: row.get::<_, i64>(0)? as u64,
        previous_hash: row.get(1)?,
        actor_id: row.get(2)?,
        action: row.get(3)?,
        resource_type: row.get(4)?,
        resource_id: row.get(5)?,
        details,
        timestamp,
        key_version: row.get::<_, i64>(8)? as u32,
        hash: row.get(9)?,
        idempotency_key,
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerificationRun> {
    let run_id_text: String = row.get(0)?;
    let run_id = Uuid::parse_str(&run_id_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let run_at_text: String = row.get(1)?;
    let run_at = DateTime::parse_from_rfc3339(&run_at_text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(VerificationRun {
        run_id,
        run_at,
        intact: row.get(2)?,
        total_entries: row.get::<_, i64>(3)? as u64,
        verified_entries: row.get::<_, i64>(4)? as u64,
        broken_at_sequence_id: row.get::<_, Option<i64>>(5)?.map(|v| v as u64),
        details: row.get(6)?,
    })
}

// ── ChainStore ────────────────────────────────────────────────────────────────

impl ChainStore for SqliteStore {
    fn append(&self, entry: &ChainEntry) -> CustodiaResult<()> {
        let conn = self.lock()?;

        // The append engine serializes writers, but the schema-level check
        // still stands between a racing second writer and a forked chain.
        let expected: u64 = conn
            .query_row("SELECT MAX(sequence_id) FROM chain_entries", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(|e| persistence("read chain tail", e))?
            .map(|v| v as u64 + 1)
            .unwrap_or(1);

        if entry.sequence_id != expected {
            return Err(CustodiaError::Persistence {
                reason: format!(
                    "sequence conflict: expected {expected}, got {}",
                    entry.sequence_id
                ),
            });
        }

        conn.execute(
            &format!("INSERT INTO chain_entries ({ENTRY_COLUMNS}) \
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                entry.sequence_id as i64,
                entry.previous_hash,
                entry.actor_id,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                custodia_chain::canonical_json(&entry.details),
                canonical_timestamp(&entry.timestamp),
                entry.key_version as i64,
                entry.hash,
                entry.idempotency_key.map(|k| k.to_string()),
            ],
        )
        .map_err(|e| persistence("insert chain entry", e))?;

        Ok(())
    }

    fn tail(&self) -> CustodiaResult<Option<(u64, String)>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT sequence_id, hash FROM chain_entries ORDER BY sequence_id DESC LIMIT 1",
            [],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(|e| persistence("read chain tail", e))
    }

    fn scan(&self, after: Option<u64>, limit: usize) -> CustodiaResult<Vec<ChainEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM chain_entries \
                 WHERE sequence_id > ?1 ORDER BY sequence_id ASC LIMIT ?2"
            ))
            .map_err(|e| persistence("prepare scan", e))?;

        let rows = stmt
            .query_map(
                params![after.unwrap_or(0) as i64, limit as i64],
                row_to_entry,
            )
            .map_err(|e| persistence("scan entries", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| persistence("read entry", e))
    }

    fn count(&self) -> CustodiaResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chain_entries", [], |row| row.get(0))
            .map_err(|e| persistence("count entries", e))?;
        Ok(count as u64)
    }

    fn find_idempotent(&self, key: &Uuid) -> CustodiaResult<Option<u64>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT sequence_id FROM chain_entries WHERE idempotency_key = ?1",
            params![key.to_string()],
            |row| row.get::<_, i64>(0).map(|v| v as u64),
        )
        .optional()
        .map_err(|e| persistence("look up idempotency key", e))
    }

    fn query(&self, filter: &EntryFilter) -> CustodiaResult<Vec<ChainEntry>> {
        let conn = self.lock()?;

        // Canonical timestamps compare correctly as text: fixed width,
        // fixed precision, fixed offset.
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM chain_entries WHERE 1=1");
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(action) = &filter.action {
            sql.push_str(" AND action = ?");
            values.push(Box::new(action.clone()));
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND timestamp >= ?");
            values.push(Box::new(canonical_timestamp(since)));
        }
        if let Some(until) = &filter.until {
            sql.push_str(" AND timestamp <= ?");
            values.push(Box::new(canonical_timestamp(until)));
        }
        sql.push_str(" ORDER BY timestamp DESC, sequence_id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| persistence("prepare query", e))?;
        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_entry)
            .map_err(|e| persistence("query entries", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| persistence("read entry", e))
    }
}

// ── SecretStore ───────────────────────────────────────────────────────────────

impl SecretStore for SqliteStore {
    fn active(&self) -> CustodiaResult<SecretVersion> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT sv.version, sv.secret, sv.created_at \
             FROM active_secret a JOIN secret_versions sv ON sv.version = a.version \
             WHERE a.id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u32,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| persistence("read active secret", e))?
        .map(|(version, secret, created_at)| parse_secret_version(version, secret, &created_at))
        .transpose()?
        .ok_or_else(|| CustodiaError::Configuration {
            reason: "no active signing secret is registered".to_string(),
        })
    }

    fn secret_for(&self, version: u32) -> CustodiaResult<SecretVersion> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT version, secret, created_at FROM secret_versions WHERE version = ?1",
            params![version as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u32,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .map_err(|e| persistence("read secret version", e))?
        .map(|(v, secret, created_at)| parse_secret_version(v, secret, &created_at))
        .transpose()?
        .ok_or(CustodiaError::MissingKeyVersion { version })
    }

    fn rotate(&self, secret: &str) -> CustodiaResult<u32> {
        validate_secret(secret)?;

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| persistence("begin rotation", e))?;

        let version: u32 = tx
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM secret_versions",
                [],
                |row| row.get::<_, i64>(0).map(|v| v as u32),
            )
            .map_err(|e| persistence("read max secret version", e))?;

        // A concurrent rotation that won the race shows up here as a
        // primary-key collision; the operator retries.
        tx.execute(
            "INSERT INTO secret_versions (version, secret, created_at) VALUES (?1, ?2, ?3)",
            params![
                version as i64,
                secret,
                canonical_timestamp(&Utc::now()),
            ],
        )
        .map_err(|e| CustodiaError::Configuration {
            reason: format!("secret version {version} collision: {e}"),
        })?;

        tx.execute(
            "INSERT INTO active_secret (id, version) VALUES (1, ?1) \
             ON CONFLICT(id) DO UPDATE SET version = ?1",
            params![version as i64],
        )
        .map_err(|e| persistence("move active secret pointer", e))?;

        tx.commit().map_err(|e| persistence("commit rotation", e))?;

        info!(version, "signing secret rotated");
        Ok(version)
    }
}

fn parse_secret_version(
    version: u32,
    secret: String,
    created_at: &str,
) -> CustodiaResult<SecretVersion> {
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| persistence("parse secret created_at", e))?;
    Ok(SecretVersion {
        version,
        secret,
        created_at,
    })
}

// ── RunStore ──────────────────────────────────────────────────────────────────

impl RunStore for SqliteStore {
    fn record(&self, run: &VerificationRun) -> CustodiaResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO verification_runs ({RUN_COLUMNS}) \
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                run.run_id.to_string(),
                canonical_timestamp(&run.run_at),
                run.intact,
                run.total_entries as i64,
                run.verified_entries as i64,
                run.broken_at_sequence_id.map(|v| v as i64),
                run.details,
            ],
        )
        .map_err(|e| persistence("insert verification run", e))?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> CustodiaResult<Vec<VerificationRun>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM verification_runs \
                 ORDER BY run_at DESC, run_id DESC LIMIT ?1"
            ))
            .map_err(|e| persistence("prepare run listing", e))?;

        let rows = stmt
            .query_map(params![limit as i64], row_to_run)
            .map_err(|e| persistence("list verification runs", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| persistence("read verification run", e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
