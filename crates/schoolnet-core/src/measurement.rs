use ethers_core::types::{TxHash, U256};
use schoolnet_crypto::{commit, Commitment, MeasurementFields};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a reporting school (a 256-bit ledger word).
pub type EntityId = U256;

/// The unit of truth: five measurement fields plus the commitment stored with them.
///
/// A record is immutable once created. Records read back from the ledger keep
/// whatever commitment the ledger returned; nothing here re-derives or
/// "repairs" it, so the verifier can detect a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementRecord {
    #[serde(flatten)]
    pub fields: MeasurementFields,
    pub commitment: Commitment,
}

impl MeasurementRecord {
    /// Build a fresh record, computing its commitment.
    pub fn seal(fields: MeasurementFields) -> Self {
        Self {
            fields,
            commitment: commit(&fields),
        }
    }

    /// Wrap fields and a commitment exactly as the ledger returned them.
    pub fn from_stored(fields: MeasurementFields, commitment: Commitment) -> Self {
        Self { fields, commitment }
    }

    pub fn entity_id(&self) -> EntityId {
        self.fields.entity_id
    }

    pub fn timestamp(&self) -> U256 {
        self.fields.timestamp
    }

    pub fn download_speed_mbps(&self) -> u32 {
        self.fields.download_speed_mbps
    }

    pub fn upload_speed_mbps(&self) -> u32 {
        self.fields.upload_speed_mbps
    }

    pub fn latency_ms(&self) -> u32 {
        self.fields.latency_ms
    }
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "school {} @ {}: down {} Mbps, up {} Mbps, latency {} ms, hash {}",
            self.fields.entity_id,
            self.fields.timestamp,
            self.fields.download_speed_mbps,
            self.fields.upload_speed_mbps,
            self.fields.latency_ms,
            self.commitment
        )
    }
}

/// Where an event sits in the ledger's emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerPosition {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: TxHash,
}

impl Ord for LedgerPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.block_number, self.log_index, self.transaction_hash).cmp(&(
            other.block_number,
            other.log_index,
            other.transaction_hash,
        ))
    }
}

impl PartialOrd for LedgerPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A `DataSubmitted` event: the stored record and where it was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSubmitted {
    pub record: MeasurementRecord,
    pub position: LedgerPosition,
}
