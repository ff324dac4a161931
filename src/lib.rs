//! Tamper-evident ledger for file provenance events.
//!
//! Blocks are chained by SHA-256 content hashes and sealed with a small
//! proof-of-work. Any edit to a stored block that is not matched by a new
//! hash (and a re-mined, re-linked tail) fails [`Ledger::verify`].

pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pow;
pub mod routes;
pub mod storage;
pub mod transaction;

pub use config::{LedgerConfig, ServerConfig};
pub use error::{ChainViolation, LedgerError, Result};
pub use ledger::Ledger;
pub use model::Block;
pub use storage::{BlockRecord, ChainStore, JsonFileStore};
pub use transaction::FileEvent;
