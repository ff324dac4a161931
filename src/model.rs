//! Ledger blocks and the content hash that binds them together.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Payload stored in the first block of every chain.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// One ledger entry.
///
/// All fields are private. A block computes its own hash when constructed
/// with [`Block::new`]; afterwards only the miner may advance the nonce, and
/// only before the block is handed to the ledger. Blocks read back from
/// storage go through [`Block::from_parts`], which keeps the stored hash as
/// is so that verification can notice a mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    position: u64,
    timestamp: String,
    payload: Value,
    previous_hash: String,
    nonce: u64,
    hash: String,
}

impl Block {
    /// Builds an unsealed block (nonce 0) and computes its hash.
    pub fn new(
        position: u64,
        timestamp: impl Into<String>,
        payload: Value,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            position,
            timestamp: timestamp.into(),
            payload,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// The fixed first block. Never mined.
    pub fn genesis(timestamp: impl Into<String>) -> Self {
        Self::new(
            0,
            timestamp,
            Value::String(GENESIS_PAYLOAD.to_string()),
            GENESIS_PREVIOUS_HASH,
        )
    }

    /// Rebuilds a block from a fully persisted field set.
    ///
    /// The hash is taken verbatim and never recomputed.
    pub fn from_parts(
        position: u64,
        timestamp: String,
        payload: Value,
        previous_hash: String,
        nonce: u64,
        hash: String,
    ) -> Self {
        Self {
            position,
            timestamp,
            payload,
            previous_hash,
            nonce,
            hash,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Stored content hash (lowercase hex).
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Hashes the stored fields, ignoring the stored hash.
    pub fn recompute_hash(&self) -> String {
        compute_hash(
            self.position,
            &self.timestamp,
            &self.payload,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// True when the stored hash starts with `difficulty` zero hex digits.
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        self.position == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// One mining step: bump the nonce and rehash.
    pub(crate) fn advance_nonce(&mut self) {
        self.nonce += 1;
        self.hash = self.recompute_hash();
    }
}

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Content hash of a block: SHA-256 over
/// `position ++ timestamp ++ payload ++ previous_hash ++ nonce`.
///
/// The payload is rendered as compact JSON. `serde_json` keeps object keys
/// sorted unless `preserve_order` is enabled, so equal values always render
/// identically, including after a storage round trip.
pub fn compute_hash(
    position: u64,
    timestamp: &str,
    payload: &Value,
    previous_hash: &str,
    nonce: u64,
) -> String {
    hash_concat(&[
        position.to_string().as_bytes(),
        timestamp.as_bytes(),
        canonical_payload(payload).as_bytes(),
        previous_hash.as_bytes(),
        nonce.to_string().as_bytes(),
    ])
}

/// Deterministic string form of a payload used as hash input.
///
/// Floats print in shortest round-trip form, and the `float_roundtrip`
/// parser reads them back to the same bits, so the rendering survives a
/// storage round trip.
pub fn canonical_payload(payload: &Value) -> String {
    payload.to_string()
}

/// Leading-zero predicate shared by the miner and verification.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TS: &str = "2024-09-13T13:34:56Z";

    #[test]
    fn new_block_hash_matches_recomputation() {
        let block = Block::new(1, TS, json!({"tx_type": "UPLOAD"}), "abc");
        assert_eq!(block.nonce(), 0);
        assert_eq!(block.hash(), block.recompute_hash());
        assert_eq!(block.hash().len(), 64);
    }

    #[test]
    fn hash_depends_on_every_field() {
        let base = compute_hash(1, TS, &json!({"a": 1}), "prev", 0);
        assert_ne!(base, compute_hash(2, TS, &json!({"a": 1}), "prev", 0));
        assert_ne!(base, compute_hash(1, "other", &json!({"a": 1}), "prev", 0));
        assert_ne!(base, compute_hash(1, TS, &json!({"a": 2}), "prev", 0));
        assert_ne!(base, compute_hash(1, TS, &json!({"a": 1}), "next", 0));
        assert_ne!(base, compute_hash(1, TS, &json!({"a": 1}), "prev", 1));
    }

    #[test]
    fn payload_key_order_does_not_change_the_hash() {
        let a: Value = serde_json::from_str(r#"{"owner":"alice","file_id":"f1"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"file_id":"f1","owner":"alice"}"#).unwrap();
        assert_eq!(canonical_payload(&a), canonical_payload(&b));
        assert_eq!(
            compute_hash(3, TS, &a, "p", 7),
            compute_hash(3, TS, &b, "p", 7)
        );
    }

    #[test]
    fn float_payload_renders_identically_after_reparse() {
        for f in [1.0715660391465826e-75, 0.1, 2.5e-308, 1.7976931348623157e308] {
            let payload = json!({"size": f});
            let reparsed: Value = serde_json::from_str(&canonical_payload(&payload)).unwrap();
            assert_eq!(canonical_payload(&reparsed), canonical_payload(&payload));
        }
    }

    #[test]
    fn hash_is_sha256_of_concatenated_fields() {
        let expected = hash_concat(&[b"5", TS.as_bytes(), b"{\"b\":2}", b"prev", b"42"]);
        assert_eq!(compute_hash(5, TS, &json!({"b": 2}), "prev", 42), expected);
    }

    #[test]
    fn from_parts_keeps_the_stored_hash() {
        let block = Block::from_parts(
            4,
            TS.to_string(),
            json!(null),
            "prev".to_string(),
            9,
            "not-a-real-hash".to_string(),
        );
        assert_eq!(block.hash(), "not-a-real-hash");
        assert_ne!(block.hash(), block.recompute_hash());
    }

    #[test]
    fn genesis_block_shape() {
        let genesis = Block::genesis(TS);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.position(), 0);
        assert_eq!(genesis.previous_hash(), "0");
        assert_eq!(genesis.payload(), &json!("Genesis Block"));
        assert_eq!(genesis.nonce(), 0);
    }

    #[test]
    fn advance_nonce_rehashes() {
        let mut block = Block::new(1, TS, json!({"a": 1}), "prev");
        let before = block.hash().to_string();
        block.advance_nonce();
        assert_eq!(block.nonce(), 1);
        assert_ne!(block.hash(), before);
        assert_eq!(block.hash(), block.recompute_hash());
    }

    #[test]
    fn difficulty_predicate() {
        assert!(meets_difficulty("abc", 0));
        assert!(meets_difficulty("00af", 2));
        assert!(!meets_difficulty("00af", 3));
        assert!(!meets_difficulty("00", 3));
    }
}
