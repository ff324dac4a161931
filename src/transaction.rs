//! Typed payloads for file-management events.
//!
//! The ledger stores payloads as opaque JSON. These types describe the
//! events the storage-tracking application records, and are what the
//! `/events` endpoint accepts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    /// A file enters tracked storage.
    Upload,
    /// A file changes location within the same storage tier.
    Move,
    /// A file changes storage tier.
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageType {
    Local,
    Hdd,
    Ssd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub storage_type: StorageType,
    pub location: String,
    /// Content identifier of the stored manifest, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub size: u64,
    pub format: String,
}

/// One upload, move or migration of a tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub tx_type: TxType,
    pub file_id: String,
    /// Content digest of the file, e.g. `sha256:…`.
    pub file_hash: String,
    pub owner: String,
    /// Unix seconds at which the event happened, as reported by the caller.
    pub timestamp: i64,
    pub source: StorageLocation,
    pub destination: StorageLocation,
    pub version: u32,
    pub metadata: FileMetadata,
    /// Caller-supplied signature; carried, not checked.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("{0:?} event has identical source and destination")]
    NoOpTransfer(TxType),

    #[error("MOVE must stay on {0:?}; use MIGRATE to change storage type")]
    TierChangeOnMove(StorageType),
}

impl FileEvent {
    pub fn validate(&self) -> Result<(), EventError> {
        for (name, value) in [
            ("file_id", &self.file_id),
            ("file_hash", &self.file_hash),
            ("owner", &self.owner),
        ] {
            if value.trim().is_empty() {
                return Err(EventError::EmptyField(name));
            }
        }

        match self.tx_type {
            TxType::Upload => {}
            TxType::Move | TxType::Migrate if self.source == self.destination => {
                return Err(EventError::NoOpTransfer(self.tx_type));
            }
            TxType::Move if self.source.storage_type != self.destination.storage_type => {
                return Err(EventError::TierChangeOnMove(self.source.storage_type));
            }
            TxType::Move | TxType::Migrate => {}
        }
        Ok(())
    }

    /// JSON form appended to the ledger.
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload_json() -> Value {
        json!({
            "tx_type": "UPLOAD",
            "file_id": "uuid-123",
            "file_hash": "sha256:abc123",
            "owner": "alice",
            "timestamp": 1694612096,
            "source": {"storage_type": "LOCAL", "location": "/local/path/photo.jpg"},
            "destination": {
                "storage_type": "HDD",
                "location": "server_2:/mnt/hdd1/partition3",
                "cid": "QmManifestCID"
            },
            "version": 1,
            "metadata": {"file_name": "photo.jpg", "size": 523000, "format": "jpg"},
            "signature": "0xdeadbeef"
        })
    }

    #[test]
    fn parses_upload_event() {
        let event: FileEvent = serde_json::from_value(upload_json()).unwrap();
        assert_eq!(event.tx_type, TxType::Upload);
        assert_eq!(event.source.cid, None);
        assert_eq!(event.destination.cid.as_deref(), Some("QmManifestCID"));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn payload_matches_the_wire_form() {
        let event: FileEvent = serde_json::from_value(upload_json()).unwrap();
        assert_eq!(event.to_payload().unwrap(), upload_json());
    }

    #[test]
    fn unknown_tx_type_is_rejected() {
        let mut raw = upload_json();
        raw["tx_type"] = json!("DELETE");
        assert!(serde_json::from_value::<FileEvent>(raw).is_err());
    }

    #[test]
    fn empty_owner_is_invalid() {
        let mut event: FileEvent = serde_json::from_value(upload_json()).unwrap();
        event.owner = "  ".to_string();
        assert_eq!(event.validate(), Err(EventError::EmptyField("owner")));
    }

    #[test]
    fn move_across_tiers_is_invalid() {
        let mut event: FileEvent = serde_json::from_value(upload_json()).unwrap();
        event.tx_type = TxType::Move;
        assert_eq!(
            event.validate(),
            Err(EventError::TierChangeOnMove(StorageType::Local))
        );

        event.tx_type = TxType::Migrate;
        assert!(event.validate().is_ok());
    }

    #[test]
    fn transfer_to_same_place_is_invalid() {
        let mut event: FileEvent = serde_json::from_value(upload_json()).unwrap();
        event.tx_type = TxType::Move;
        event.destination = event.source.clone();
        assert_eq!(event.validate(), Err(EventError::NoOpTransfer(TxType::Move)));
    }
}
