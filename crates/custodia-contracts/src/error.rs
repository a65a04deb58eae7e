//! Error taxonomy for the CUSTODIA audit chain.
//!
//! All fallible operations return `CustodiaResult<T>`.  The variants map to
//! the three infrastructure failure classes of the subsystem; a detected
//! chain break is deliberately NOT here — tampering is the expected,
//! reportable outcome of verification and travels as `intact = false`
//! inside a `VerificationReport`, never as an `Err`.

use thiserror::Error;

/// The unified error type for the CUSTODIA crates.
#[derive(Debug, Error)]
pub enum CustodiaError {
    /// A required secret or key version is missing, empty, or otherwise
    /// unusable.  Fatal to the operation — appending or rotating must never
    /// proceed with a degraded or default key.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// The underlying store failed to read or write.
    ///
    /// For `append` this means the audit fact may be lost; callers must
    /// surface it for retry or alerting rather than swallowing it.
    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    /// A verification pass met an entry whose `key_version` has no secret
    /// in the store.  This blocks verifying that entry but is an
    /// operational retention problem, not evidence of tampering, and is
    /// reported distinctly from a hash mismatch.
    #[error("secret version {version} is not available in the secret store")]
    MissingKeyVersion { version: u32 },
}

/// Convenience alias used throughout the CUSTODIA crates.
pub type CustodiaResult<T> = Result<T, CustodiaError>;
