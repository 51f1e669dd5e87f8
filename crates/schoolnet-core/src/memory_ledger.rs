//! In-process ledger with the same observable contract as the deployed
//! registry: latest-value state per school plus an append-only
//! `DataSubmitted` log, one block per accepted transaction.
//!
//! SAFETY GUARANTEES:
//! - State only changes when a submission is mined; rejected, reverted,
//!   and dropped submissions leave no partial record.
//! - Held submissions wait in the pending queue until [`MemoryLedger::mine_pending`]
//!   mines them, whether or not anyone is still waiting on them.
//! - Event order is block order; a later block never precedes an earlier one.
//! - Fault switches are one-shot unless stated otherwise.

use async_trait::async_trait;
use ethers_core::types::TxHash;
use log::debug;
use parking_lot::Mutex;
use schoolnet_crypto::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::{AuthError, LedgerError};
use crate::ledger::{FinalityReceipt, LedgerConnector, LedgerReader, LedgerWriter, PendingSubmission};
use crate::measurement::{DataSubmitted, EntityId, LedgerPosition, MeasurementRecord};

// ==================== STATE ====================

#[derive(Default)]
struct Faults {
    reject_next: Option<String>,
    revert_next: bool,
    drop_next: bool,
    /// Sticky: accepted submissions are queued instead of mined.
    hold_finality: bool,
    /// Sticky: every read fails with a transport error.
    fail_reads: Option<String>,
    /// Sticky: history is returned newest-first, as an unordered transport might.
    reverse_logs: bool,
}

#[derive(Default)]
struct State {
    block_number: u64,
    nonce: u64,
    latest: HashMap<EntityId, MeasurementRecord>,
    /// Indexed topic alongside the event payload.
    events: Vec<(EntityId, DataSubmitted)>,
    /// Accepted but not yet mined, in acceptance order.
    pending: Vec<(TxHash, MeasurementRecord)>,
    /// Block each mined transaction landed in.
    mined: HashMap<TxHash, u64>,
    faults: Faults,
    interactions: u64,
}

impl State {
    /// Append `record` in a new block and return the block number.
    fn mine(&mut self, tx_hash: TxHash, record: MeasurementRecord) -> u64 {
        self.block_number += 1;
        let position = LedgerPosition {
            block_number: self.block_number,
            log_index: 0,
            transaction_hash: tx_hash,
        };
        self.latest.insert(record.entity_id(), record);
        self.events.push((record.entity_id(), DataSubmitted { record, position }));
        self.mined.insert(tx_hash, self.block_number);
        debug!("Mined tx {:#x} in block {}", tx_hash, self.block_number);
        self.block_number
    }
}

/// Cloning shares the underlying ledger.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
    /// Latest block number, for pending submissions waiting on a later block.
    blocks: Arc<watch::Sender<u64>>,
    signer_enabled: bool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            blocks: Arc::new(watch::channel(0).0),
            signer_enabled: true,
        }
    }

    /// A handle onto the same ledger with no signing capability.
    pub fn read_only(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            blocks: Arc::clone(&self.blocks),
            signer_enabled: false,
        }
    }

    // ==================== FAULT INJECTION ====================

    pub fn reject_next(&self, reason: impl Into<String>) {
        self.state.lock().faults.reject_next = Some(reason.into());
    }

    pub fn revert_next(&self) {
        self.state.lock().faults.revert_next = true;
    }

    pub fn drop_next(&self) {
        self.state.lock().faults.drop_next = true;
    }

    /// While set, accepted submissions are queued instead of mined.
    /// Clearing it does not mine what is already queued.
    pub fn hold_finality(&self, hold: bool) {
        self.state.lock().faults.hold_finality = hold;
    }

    /// Mine every queued submission, one block each, in acceptance order.
    /// Returns how many were mined.
    pub fn mine_pending(&self) -> usize {
        let (count, head) = {
            let mut state = self.state.lock();
            let queued = std::mem::take(&mut state.pending);
            for (tx_hash, record) in &queued {
                state.mine(*tx_hash, *record);
            }
            (queued.len(), state.block_number)
        };
        if count > 0 {
            self.blocks.send_replace(head);
        }
        count
    }

    pub fn fail_reads(&self, reason: Option<String>) {
        self.state.lock().faults.fail_reads = reason;
    }

    pub fn reverse_logs(&self, reverse: bool) {
        self.state.lock().faults.reverse_logs = reverse;
    }

    /// Rewrite the stored latest record for `entity_id` in place.
    /// Returns false when the school has no record.
    pub fn tamper_latest(&self, entity_id: EntityId, edit: impl FnOnce(&mut MeasurementRecord)) -> bool {
        let mut state = self.state.lock();
        match state.latest.get_mut(&entity_id) {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    /// Rewrite the `nth` (emission order) event for `entity_id`.
    pub fn tamper_event(&self, entity_id: EntityId, nth: usize, edit: impl FnOnce(&mut MeasurementRecord)) -> bool {
        let mut state = self.state.lock();
        match state
            .events
            .iter_mut()
            .filter(|(topic, _)| *topic == entity_id)
            .nth(nth)
        {
            Some((_, ev)) => {
                edit(&mut ev.record);
                true
            }
            None => false,
        }
    }

    /// Append an event under `topic` verbatim, bypassing submission. The
    /// payload need not match the topic, which models a misbehaving log source.
    pub fn inject_event(&self, topic: EntityId, event: DataSubmitted) {
        self.state.lock().events.push((topic, event));
    }

    // ==================== INSPECTION ====================

    /// Number of reads and writes that reached the ledger.
    pub fn interactions(&self) -> u64 {
        self.state.lock().interactions
    }

    pub fn block_number(&self) -> u64 {
        self.state.lock().block_number
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

// ==================== LEDGER TRAITS ====================

enum Outcome {
    Mined(u64),
    Reverted,
    Dropped,
    Held {
        state: Arc<Mutex<State>>,
        blocks: watch::Receiver<u64>,
    },
}

pub struct MemoryPending {
    tx_hash: TxHash,
    outcome: Outcome,
}

#[async_trait]
impl PendingSubmission for MemoryPending {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn finalized(self: Box<Self>) -> Result<FinalityReceipt, LedgerError> {
        match self.outcome {
            Outcome::Mined(block_number) => Ok(FinalityReceipt {
                tx_hash: self.tx_hash,
                block_number,
            }),
            Outcome::Reverted => Err(LedgerError::Reverted(self.tx_hash)),
            Outcome::Dropped => Err(LedgerError::Dropped(self.tx_hash)),
            Outcome::Held { state, mut blocks } => loop {
                let mined = state.lock().mined.get(&self.tx_hash).copied();
                if let Some(block_number) = mined {
                    return Ok(FinalityReceipt {
                        tx_hash: self.tx_hash,
                        block_number,
                    });
                }
                if blocks.changed().await.is_err() {
                    // Every ledger handle is gone; nothing can mine it any more.
                    return std::future::pending().await;
                }
            },
        }
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedger {
    async fn submit_data(&self, record: &MeasurementRecord) -> Result<Box<dyn PendingSubmission>, LedgerError> {
        let mut state = self.state.lock();
        state.interactions += 1;

        if let Some(reason) = state.faults.reject_next.take() {
            return Err(LedgerError::Rejected(reason));
        }

        state.nonce += 1;
        let mut preimage = state.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(record.commitment.as_bytes());
        let tx_hash = TxHash::from(keccak256(&preimage));

        let outcome = if std::mem::take(&mut state.faults.revert_next) {
            Outcome::Reverted
        } else if std::mem::take(&mut state.faults.drop_next) {
            Outcome::Dropped
        } else if state.faults.hold_finality {
            state.pending.push((tx_hash, *record));
            debug!("Queued tx {:#x} without mining", tx_hash);
            Outcome::Held {
                state: Arc::clone(&self.state),
                blocks: self.blocks.subscribe(),
            }
        } else {
            let block_number = state.mine(tx_hash, *record);
            drop(state);
            self.blocks.send_replace(block_number);
            Outcome::Mined(block_number)
        };

        Ok(Box::new(MemoryPending { tx_hash, outcome }))
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn get_latest_data(&self, entity_id: EntityId) -> Result<Option<MeasurementRecord>, LedgerError> {
        let mut state = self.state.lock();
        state.interactions += 1;
        if let Some(reason) = &state.faults.fail_reads {
            return Err(LedgerError::Transport(reason.clone()));
        }
        Ok(state.latest.get(&entity_id).copied())
    }

    async fn query_data_submitted(&self, entity_id: EntityId) -> Result<Vec<DataSubmitted>, LedgerError> {
        let mut state = self.state.lock();
        state.interactions += 1;
        if let Some(reason) = &state.faults.fail_reads {
            return Err(LedgerError::Transport(reason.clone()));
        }

        let mut events: Vec<DataSubmitted> = state
            .events
            .iter()
            .filter(|(topic, _)| *topic == entity_id)
            .map(|(_, ev)| *ev)
            .collect();
        if state.faults.reverse_logs {
            events.reverse();
        }
        Ok(events)
    }
}

impl LedgerConnector for MemoryLedger {
    type Reader = MemoryLedger;
    type Writer = MemoryLedger;

    fn reader(&self) -> Result<Self::Reader, LedgerError> {
        Ok(self.clone())
    }

    fn signer(&self) -> Result<Self::Writer, AuthError> {
        if !self.signer_enabled {
            return Err(AuthError::SignerUnavailable("no signing key configured".into()));
        }
        Ok(self.clone())
    }
}
