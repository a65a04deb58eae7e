//! # custodia-core
//!
//! Trait seams between the CUSTODIA chain logic and its storage.
//!
//! The append engine, verifier, and run recorder depend on these traits
//! rather than on any backend, which keeps the integrity machinery testable
//! with injected fakes and lets deployments choose between the in-memory
//! reference stores and the SQLite backend.

pub mod traits;

pub use traits::{ChainStore, RunStore, SecretStore};
