//! Submission client: normalize, commit, write, and (optionally) await finality.

use ethers_core::types::TxHash;
use log::{info, warn};
use schoolnet_crypto::{IntoMetric, IntoWord, MeasurementFields};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::{ClientError, NotFinalizedReason, SubmissionError};
use crate::ledger::{FinalityReceipt, LedgerConnector, LedgerWriter, PendingSubmission};
use crate::measurement::MeasurementRecord;

/// Default upper bound on a finality wait.
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Submits measurements through a signer acquired per call.
///
/// No retries: a rejected, reverted, or timed-out submission is reported to
/// the caller. Resubmitting the same values creates a new, independent record.
pub struct SubmissionClient<C> {
    connector: C,
    finality_timeout: Duration,
}

impl<C: LedgerConnector> SubmissionClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            finality_timeout: DEFAULT_FINALITY_TIMEOUT,
        }
    }

    pub fn with_finality_timeout(mut self, timeout: Duration) -> Self {
        self.finality_timeout = timeout;
        self
    }

    pub fn finality_timeout(&self) -> Duration {
        self.finality_timeout
    }

    /// Validate and normalize loosely-typed fields, then submit.
    ///
    /// Invalid input fails with [`ClientError::Encoding`] before any ledger
    /// interaction.
    pub async fn submit(
        &self,
        entity_id: impl IntoWord,
        timestamp: impl IntoWord,
        download_speed_mbps: impl IntoMetric,
        upload_speed_mbps: impl IntoMetric,
        latency_ms: impl IntoMetric,
    ) -> Result<TransactionHandle, ClientError> {
        let fields = MeasurementFields::normalize(
            entity_id,
            timestamp,
            download_speed_mbps,
            upload_speed_mbps,
            latency_ms,
        )?;
        self.submit_fields(fields).await
    }

    /// Submit already-normalized fields.
    pub async fn submit_fields(&self, fields: MeasurementFields) -> Result<TransactionHandle, ClientError> {
        let record = MeasurementRecord::seal(fields);

        // Signer first: a missing signer must fail before the network is touched.
        let writer = self.connector.signer()?;

        let pending = writer.submit_data(&record).await.map_err(|e| {
            warn!("Submission for school {} rejected: {}", record.entity_id(), e);
            SubmissionError::from(e)
        })?;

        let tx_hash = pending.tx_hash();
        info!(
            "Submission for school {} accepted: tx {:#x}, commitment {}",
            record.entity_id(),
            tx_hash,
            record.commitment
        );

        Ok(TransactionHandle {
            tx_hash,
            record,
            pending,
            finality_timeout: self.finality_timeout,
        })
    }
}

/// A submission accepted into the ledger's pending queue.
///
/// Dropping the handle abandons the finality wait; the transaction may still
/// finalize on the ledger.
pub struct TransactionHandle {
    tx_hash: TxHash,
    record: MeasurementRecord,
    pending: Box<dyn PendingSubmission>,
    finality_timeout: Duration,
}

impl TransactionHandle {
    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// The record as submitted, including its commitment.
    pub fn record(&self) -> &MeasurementRecord {
        &self.record
    }

    /// Wait for finality, bounded by the client's finality timeout.
    pub async fn wait_finalized(self) -> Result<FinalizedSubmission, SubmissionError> {
        let timeout = self.finality_timeout;
        self.wait_finalized_within(timeout).await
    }

    pub async fn wait_finalized_within(self, timeout: Duration) -> Result<FinalizedSubmission, SubmissionError> {
        let TransactionHandle {
            tx_hash,
            record,
            pending,
            ..
        } = self;

        let receipt = match tokio::time::timeout(timeout, pending.finalized()).await {
            Err(_) => {
                warn!("Finality wait for tx {:#x} timed out after {:?}", tx_hash, timeout);
                return Err(SubmissionError::NotFinalized(NotFinalizedReason::TimedOut(timeout)));
            }
            Ok(Err(e)) => {
                warn!("Tx {:#x} did not finalize: {}", tx_hash, e);
                return Err(e.into());
            }
            Ok(Ok(receipt)) => receipt,
        };

        info!(
            "Tx {:#x} finalized in block {} for school {}",
            receipt.tx_hash,
            receipt.block_number,
            record.entity_id()
        );
        Ok(FinalizedSubmission { record, receipt })
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("tx_hash", &self.tx_hash)
            .field("record", &self.record)
            .field("finality_timeout", &self.finality_timeout)
            .finish_non_exhaustive()
    }
}

/// A submission the ledger has made durable and queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedSubmission {
    pub record: MeasurementRecord,
    pub receipt: FinalityReceipt,
}
