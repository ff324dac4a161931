//! Error taxonomy for the ledger and its storage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The first broken invariant found while walking the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainViolation {
    /// Stored hash disagrees with a recomputation over the stored fields.
    #[error("block {position} hash does not match its contents")]
    HashMismatch { position: u64 },

    /// `previous_hash` does not equal the hash of the preceding block.
    #[error("block {position} is not linked to its predecessor")]
    BrokenLink { position: u64 },

    /// A block claims a position other than its index in the chain.
    #[error("block at index {index} claims position {position}")]
    PositionMismatch { index: usize, position: u64 },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Pre-append verification failed; nothing was appended.
    #[error("chain integrity violation: {0}")]
    IntegrityViolation(ChainViolation),

    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted record could not be turned back into a block.
    #[error("malformed record{}: {reason}", record_suffix(.index))]
    MalformedRecord { index: Option<usize>, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("sealing of block {position} was cancelled")]
    SealingCancelled { position: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(index: Option<usize>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            index,
            reason: reason.into(),
        }
    }
}

fn record_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" {i}")).unwrap_or_default()
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_message_includes_index() {
        let err = LedgerError::malformed(Some(2), "missing field `nonce`");
        assert_eq!(err.to_string(), "malformed record 2: missing field `nonce`");

        let err = LedgerError::malformed(None, "expected a JSON array");
        assert_eq!(err.to_string(), "malformed record: expected a JSON array");
    }

    #[test]
    fn integrity_violation_wraps_the_violation() {
        let err = LedgerError::IntegrityViolation(ChainViolation::BrokenLink { position: 3 });
        assert_eq!(
            err.to_string(),
            "chain integrity violation: block 3 is not linked to its predecessor"
        );
    }
}
