//! # custodia-store
//!
//! Durable, append-only SQLite storage for the CUSTODIA audit chain.
//!
//! One `SqliteStore` implements all three store traits — chain entries,
//! secret versions, verification runs — over a single database file, with
//! UPDATE/DELETE triggers standing in for the access-control policy a
//! managed database would enforce.  Everything above this crate talks to
//! the traits in `custodia-core` and never sees SQL.

pub mod sqlite;

pub use sqlite::SqliteStore;
