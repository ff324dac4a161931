//! Proof-of-work sealing.
//!
//! A block is sealed once its hash starts with `difficulty` zero hex
//! digits. Expected work is about `16^difficulty` hash evaluations and there
//! is no attempt cap: the caller's thread is occupied until the search ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::model::Block;

/// Seals `block` in place. Only the nonce and hash change.
pub fn mine(block: &mut Block, difficulty: usize) {
    let started = Instant::now();
    debug!(position = block.position(), difficulty, "mining block");
    while !block.meets_difficulty(difficulty) {
        block.advance_nonce();
    }
    log_sealed(block, started);
}

/// Like [`mine`], but gives up when `stop` is raised.
///
/// The flag is checked between nonce increments. On cancellation the block
/// is left with whatever nonce it reached and must not be appended.
pub fn mine_until(block: &mut Block, difficulty: usize, stop: &AtomicBool) -> Result<()> {
    let started = Instant::now();
    debug!(position = block.position(), difficulty, "mining block");
    while !block.meets_difficulty(difficulty) {
        if stop.load(Ordering::Relaxed) {
            info!(
                position = block.position(),
                attempts = block.nonce(),
                "mining cancelled"
            );
            return Err(LedgerError::SealingCancelled {
                position: block.position(),
            });
        }
        block.advance_nonce();
    }
    log_sealed(block, started);
    Ok(())
}

fn log_sealed(block: &Block, started: Instant) {
    info!(
        position = block.position(),
        nonce = block.nonce(),
        hash = block.hash(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "block mined"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block() -> Block {
        Block::new(1, "2024-09-13T13:34:56Z", json!({"tx_type": "MOVE"}), "prev")
    }

    #[test]
    fn mined_hash_meets_difficulty() {
        for difficulty in 0..=3 {
            let mut b = block();
            mine(&mut b, difficulty);
            assert!(b.hash().starts_with(&"0".repeat(difficulty)));
            assert_eq!(b.hash(), b.recompute_hash());
        }
    }

    #[test]
    fn difficulty_zero_leaves_block_untouched() {
        let mut b = block();
        let before = b.clone();
        mine(&mut b, 0);
        assert_eq!(b, before);
    }

    #[test]
    fn mining_only_changes_nonce_and_hash() {
        let mut b = block();
        let before = b.clone();
        mine(&mut b, 2);
        assert_eq!(b.position(), before.position());
        assert_eq!(b.timestamp(), before.timestamp());
        assert_eq!(b.payload(), before.payload());
        assert_eq!(b.previous_hash(), before.previous_hash());
    }

    #[test]
    fn raised_stop_flag_cancels_mining() {
        let mut b = block();
        let stop = AtomicBool::new(true);
        // Difficulty 64 is practically unreachable, so only the flag ends the loop.
        let err = mine_until(&mut b, 64, &stop).unwrap_err();
        assert!(matches!(err, LedgerError::SealingCancelled { position: 1 }));
    }

    #[test]
    fn mine_until_seals_when_not_stopped() {
        let mut b = block();
        let stop = AtomicBool::new(false);
        mine_until(&mut b, 2, &stop).unwrap();
        assert!(b.meets_difficulty(2));
    }
}
