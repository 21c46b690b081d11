#![deny(unused)]
//! Module and score persistence for Playgate.
//!
//! Two backends implement the core storage traits:
//! - in-memory (DashMap) for development and tests
//! - SQLite (rusqlite) for single-node deployments

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryModuleStore, InMemoryScoreLedger};
pub use sqlite::{SqliteModuleStore, SqliteScoreLedger};
