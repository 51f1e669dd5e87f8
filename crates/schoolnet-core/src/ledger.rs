//! Interfaces to the external ledger.
//!
//! The ledger is an append-only, globally ordered key-value + event store. It
//! is reached through a [`LedgerConnector`] that hands out a fresh reader or
//! signer capability per operation; nothing here holds a long-lived
//! connection.

use async_trait::async_trait;
use ethers_core::types::TxHash;
use serde::{Deserialize, Serialize};

use crate::errors::{AuthError, LedgerError};
use crate::measurement::{DataSubmitted, EntityId, MeasurementRecord};

/// Read access: latest-value state and the `DataSubmitted` event log.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// `getLatestData(entityId)`. `Ok(None)` when the entity never submitted.
    async fn get_latest_data(&self, entity_id: EntityId) -> Result<Option<MeasurementRecord>, LedgerError>;

    /// All `DataSubmitted` events whose indexed entity id matches, over the
    /// full range. Ordering is whatever the transport returns.
    async fn query_data_submitted(&self, entity_id: EntityId) -> Result<Vec<DataSubmitted>, LedgerError>;
}

/// Write access through an authorized signer.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// `submitData(entityId, timestamp, download, upload, latency, commitment)`.
    ///
    /// Returning `Ok` means the ledger accepted the transaction into its
    /// pending queue; it is not final yet.
    async fn submit_data(&self, record: &MeasurementRecord) -> Result<Box<dyn PendingSubmission>, LedgerError>;
}

/// A broadcast transaction whose finality has not been observed yet.
///
/// Dropping it abandons the wait; the transaction itself is not cancelled.
#[async_trait]
pub trait PendingSubmission: Send {
    fn tx_hash(&self) -> TxHash;

    /// Resolves once the transaction is final, reverted, or dropped.
    async fn finalized(self: Box<Self>) -> Result<FinalityReceipt, LedgerError>;
}

/// Proof that a submission reached finality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalityReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// Source of scoped ledger capabilities.
pub trait LedgerConnector: Send + Sync {
    type Reader: LedgerReader;
    type Writer: LedgerWriter;

    /// Acquire read access for a single operation.
    fn reader(&self) -> Result<Self::Reader, LedgerError>;

    /// Acquire a signer for a single operation. Must not touch the network
    /// when no signing capability is configured.
    fn signer(&self) -> Result<Self::Writer, AuthError>;
}
