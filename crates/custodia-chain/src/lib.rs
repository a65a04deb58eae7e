//! # custodia-chain
//!
//! Keyed hash-chain primitives for the CUSTODIA audit trail: the chain
//! hasher, the append engine, and in-memory reference stores.
//!
//! ## Overview
//!
//! Every audit fact is wrapped in a `ChainEntry` that links to the previous
//! entry via an HMAC-SHA256 digest keyed with a versioned operator secret.
//! Tampering with any entry — even a single byte — breaks either its digest
//! or its successor's linkage, which the verifier in `custodia-verify`
//! detects.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use custodia_chain::{AppendEngine, InMemoryChainStore, InMemorySecretStore};
//! use custodia_contracts::entry::AppendRequest;
//!
//! let chain = Arc::new(InMemoryChainStore::new());
//! let secrets = Arc::new(InMemorySecretStore::with_secret("operator-issued-key")?);
//! let engine = AppendEngine::new(chain, secrets);
//!
//! let sequence = engine.append(
//!     AppendRequest::new("clinician-7", "phi_accessed", "client_file", "cf-001"),
//! )?;
//! ```

pub mod append;
pub mod hasher;
pub mod memory;

pub use append::AppendEngine;
pub use hasher::{canonical_json, canonical_timestamp, compute_entry_hash};
pub use memory::{InMemoryChainStore, InMemoryRunStore, InMemorySecretStore};

// ── Tests ─────────────────────────────────────────────────────────────────────
