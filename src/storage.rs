//! Disk persistence for the chain (one JSON document, rewritten on save).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};
use crate::model::Block;

/// Where a ledger keeps its chain between operations.
pub trait ChainStore: Send + fmt::Debug {
    /// Reads the persisted chain; `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Vec<Block>>>;

    /// Replaces the persisted chain with `chain`.
    fn save(&mut self, chain: &[Block]) -> Result<()>;

    /// Where the chain lives, for error reports and logs.
    fn location(&self) -> &Path;
}

/// Durable form of one block. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRecord {
    pub position: u64,
    pub timestamp: String,
    pub payload: Value,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl From<&Block> for BlockRecord {
    fn from(b: &Block) -> Self {
        Self {
            position: b.position(),
            timestamp: b.timestamp().to_string(),
            payload: b.payload().clone(),
            previous_hash: b.previous_hash().to_string(),
            nonce: b.nonce(),
            hash: b.hash().to_string(),
        }
    }
}

impl From<BlockRecord> for Block {
    fn from(r: BlockRecord) -> Self {
        Block::from_parts(
            r.position,
            r.timestamp,
            r.payload,
            r.previous_hash,
            r.nonce,
            r.hash,
        )
    }
}

/// Serializes the whole chain as a pretty-printed JSON array of records.
pub fn encode_chain(chain: &[Block]) -> Result<Vec<u8>> {
    let records: Vec<BlockRecord> = chain.iter().map(BlockRecord::from).collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

/// Parses a chain document.
///
/// Each record is checked on its own so a bad one is reported by index. A
/// record with a missing field or a wrongly typed field is rejected; nothing
/// is defaulted and no hash is recomputed.
pub fn decode_chain(bytes: &[u8]) -> Result<Vec<Block>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| LedgerError::malformed(None, format!("invalid JSON document: {e}")))?;
    let Value::Array(records) = document else {
        return Err(LedgerError::malformed(
            None,
            "chain document must be a JSON array",
        ));
    };
    if records.is_empty() {
        return Err(LedgerError::malformed(None, "chain document has no genesis record"));
    }

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value::<BlockRecord>(record)
                .map(Block::from)
                .map_err(|e| LedgerError::malformed(Some(index), e.to_string()))
        })
        .collect()
}

/// Ensure that the given directory exists (create recursively if needed).
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Chain persisted as a single JSON file.
///
/// Cloning yields another handle to the same file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::storage(&self.path, e)),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    fn write_document(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).map_err(|e| LedgerError::storage(parent, e))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(|e| LedgerError::storage(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| LedgerError::storage(&self.path, e))?;
        Ok(())
    }

    /// Overwrites the stored payload of the record at `position`, leaving its
    /// stored hash alone.
    ///
    /// This is a fault-injection hook for simulating tampering. It edits the
    /// document directly, the way an outside party would.
    pub fn corrupt_payload(&self, position: u64, payload: Value) -> Result<()> {
        let bytes = self.read_document()?.ok_or_else(|| {
            LedgerError::storage(
                &self.path,
                io::Error::new(io::ErrorKind::NotFound, "no chain document to corrupt"),
            )
        })?;
        let mut document: Value = serde_json::from_slice(&bytes)?;
        let record = usize::try_from(position)
            .ok()
            .and_then(|i| document.get_mut(i))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| LedgerError::malformed(None, format!("no record at position {position}")))?;
        record.insert("payload".to_string(), payload);
        warn!(position, path = %self.path.display(), "injected payload corruption");
        self.write_document(&serde_json::to_vec_pretty(&document)?)
    }
}

impl ChainStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Block>>> {
        let Some(bytes) = self.read_document()? else {
            return Ok(None);
        };
        let chain = decode_chain(&bytes)?;
        debug!(blocks = chain.len(), path = %self.path.display(), "loaded chain");
        Ok(Some(chain))
    }

    fn save(&mut self, chain: &[Block]) -> Result<()> {
        self.write_document(&encode_chain(chain)?)?;
        debug!(blocks = chain.len(), path = %self.path.display(), "saved chain");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
