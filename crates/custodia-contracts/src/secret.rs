//! Versioned signing secrets.
//!
//! The secret layer is append-only, exactly as the chain is: rotation adds
//! a new version and moves the active pointer, and prior versions remain
//! retrievable for as long as audit retention requires, because the
//! verifier must re-key historical entries with the version recorded on
//! each of them.

use chrono::{DateTime, Utc};

use crate::error::{CustodiaError, CustodiaResult};

/// Placeholder values that must never be accepted as key material.
///
/// Hashing with one of these would make every "keyed" digest forgeable by
/// anyone who can read the source tree.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "changeme",
    "change-me",
    "placeholder",
    "secret",
    "default",
    "dev-secret",
];

/// One versioned key record.
///
/// Created by an operator during rotation; never mutated or deleted once
/// written.
#[derive(Clone)]
pub struct SecretVersion {
    /// Monotonically increasing version number, starting at 1.
    pub version: u32,

    /// The opaque key material.  Kept out of Debug output and never given
    /// a Serialize impl so it cannot leak through logs or reports.
    pub secret: String,

    /// When this version was registered.
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecretVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVersion")
            .field("version", &self.version)
            .field("secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Reject empty, whitespace-only, or known placeholder key material.
///
/// Called before hashing and before rotation accepts a new version, so a
/// weak default key can never enter the chain silently.
pub fn validate_secret(secret: &str) -> CustodiaResult<()> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(CustodiaError::Configuration {
            reason: "signing secret is empty".to_string(),
        });
    }
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p))
    {
        return Err(CustodiaError::Configuration {
            reason: format!("signing secret is a known placeholder value ('{trimmed}')"),
        });
    }
    Ok(())
}
