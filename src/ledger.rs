//! The hash-chained ledger: genesis, append and whole-chain verification.

use std::io;
use std::sync::atomic::AtomicBool;

use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::error::{ChainViolation, LedgerError, Result};
use crate::model::Block;
use crate::pow;
use crate::storage::ChainStore;

/// Ordered, append-only sequence of blocks.
///
/// The chain always holds at least the genesis block. When a store is
/// attached, [`Ledger::reload`] re-reads it and [`Ledger::append`] reloads
/// before validating, so edits made to storage behind the ledger's back are
/// seen by the next append.
#[derive(Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
    difficulty: usize,
    store: Option<Box<dyn ChainStore>>,
}

/// Current UTC time as RFC 3339.
pub fn now_timestamp() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

impl Ledger {
    /// Ledger without persistence, holding only genesis.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            blocks: vec![Block::genesis(now_timestamp()?)],
            difficulty: config.difficulty,
            store: None,
        })
    }

    /// Opens the chain held by `store`, creating and persisting a
    /// genesis-only chain if the store is empty.
    pub fn open(config: &LedgerConfig, store: impl ChainStore + 'static) -> Result<Self> {
        config.validate()?;
        let mut store: Box<dyn ChainStore> = Box::new(store);

        let blocks = match store.load()? {
            Some(chain) => {
                info!(
                    "Loaded {} block(s) from {}",
                    chain.len(),
                    store.location().display()
                );
                chain
            }
            None => {
                let chain = vec![Block::genesis(now_timestamp()?)];
                store.save(&chain)?;
                info!(
                    "No chain found; created genesis at {}",
                    store.location().display()
                );
                chain
            }
        };

        let ledger = Self {
            blocks,
            difficulty: config.difficulty,
            store: Some(store),
        };
        if let Some(violation) = ledger.first_violation() {
            warn!(%violation, "persisted chain fails verification");
        }
        Ok(ledger)
    }

    /// Replaces the in-memory chain with the stored one.
    ///
    /// No-op for a ledger without a store. A document that has vanished
    /// since the ledger was opened is a storage error.
    pub fn reload(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        self.blocks = store.load()?.ok_or_else(|| {
            LedgerError::storage(
                store.location(),
                io::Error::new(io::ErrorKind::NotFound, "persisted chain is missing"),
            )
        })?;
        Ok(())
    }

    /// Appends `payload` as a new sealed block.
    ///
    /// Reloads from the store (if any) and verifies the whole chain first;
    /// a failing chain yields [`LedgerError::IntegrityViolation`] and nothing
    /// is written.
    pub fn append(&mut self, payload: Value) -> Result<&Block> {
        self.append_with(payload, |block, difficulty| {
            pow::mine(block, difficulty);
            Ok(())
        })
    }

    /// [`Ledger::append`] with sealing that stops when `stop` is raised.
    pub fn append_until(&mut self, payload: Value, stop: &AtomicBool) -> Result<&Block> {
        self.append_with(payload, |block, difficulty| {
            pow::mine_until(block, difficulty, stop)
        })
    }

    fn append_with(
        &mut self,
        payload: Value,
        seal: impl FnOnce(&mut Block, usize) -> Result<()>,
    ) -> Result<&Block> {
        self.reload()?;
        if let Some(violation) = self.first_violation() {
            warn!(%violation, "refusing to append to a compromised chain");
            return Err(LedgerError::IntegrityViolation(violation));
        }

        let previous_hash = self
            .blocks
            .last()
            .map(|b| b.hash().to_string())
            .unwrap_or_default();
        let mut block = Block::new(
            self.blocks.len() as u64,
            now_timestamp()?,
            payload,
            previous_hash,
        );
        seal(&mut block, self.difficulty)?;

        self.blocks.push(block);
        if let Err(e) = self.persist() {
            self.blocks.pop();
            return Err(e);
        }

        let index = self.blocks.len() - 1;
        let block = &self.blocks[index];
        info!(position = block.position(), hash = block.hash(), "block appended");
        Ok(block)
    }

    fn persist(&mut self) -> Result<()> {
        match self.store.as_mut() {
            Some(store) => store.save(&self.blocks),
            None => Ok(()),
        }
    }

    /// True when every block after genesis matches its recomputed hash,
    /// links to its predecessor and sits at its own position.
    pub fn verify(&self) -> bool {
        self.first_violation().is_none()
    }

    /// The first broken invariant, walking from block 1 upwards.
    ///
    /// Genesis is never checked on its own, so a genesis-only chain is
    /// always valid. Runs in linear time and never mines.
    pub fn first_violation(&self) -> Option<ChainViolation> {
        self.blocks
            .windows(2)
            .enumerate()
            .find_map(|(i, pair)| check_link(i + 1, &pair[0], &pair[1]))
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, position: u64) -> Option<&Block> {
        usize::try_from(position)
            .ok()
            .and_then(|i| self.blocks.get(i))
    }

    pub fn tail(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: every constructor installs genesis and
    /// `decode_chain` rejects an empty document.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }
}

fn check_link(index: usize, previous: &Block, current: &Block) -> Option<ChainViolation> {
    let position = current.position();
    if current.hash() != current.recompute_hash() {
        return Some(ChainViolation::HashMismatch { position });
    }
    if current.previous_hash() != previous.hash() {
        return Some(ChainViolation::BrokenLink { position });
    }
    if position != index as u64 {
        return Some(ChainViolation::PositionMismatch { index, position });
    }
    None
}
