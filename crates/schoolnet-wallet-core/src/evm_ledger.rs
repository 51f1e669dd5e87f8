//! Ledger adapter for the deployed registry contract on an EVM JSON-RPC endpoint.
//!
//! SAFETY GUARANTEES:
//! - Reads go through a plain provider; no key material is loaded for them.
//! - A signer is built per write from the configured key, with no network call.
//! - Finality means a mined receipt with the configured confirmation depth and
//!   a success status. Status 0 is a revert; a vanished transaction is dropped.
//! - An all-zero `getLatestData` answer means "never submitted"; any other
//!   answer is returned as-is for the verifier to judge.

use async_trait::async_trait;
use ethers::contract::{ContractError, LogMeta};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, PendingTransaction, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, TransactionReceipt, TxHash, H256, U256, U64};
use log::{debug, info};
use schoolnet_core::{
    AuthError, DataSubmitted, EntityId, FinalityReceipt, LedgerConnector, LedgerError, LedgerPosition,
    LedgerReader, LedgerWriter, MeasurementRecord, PendingSubmission,
};
use schoolnet_crypto::{Commitment, MeasurementFields};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::config::{ClientConfig, ConfigError};
use crate::contract::{ConnectivityRegistry, DataSubmittedFilter};
use crate::wallet_core::load_signer;

type SigningClient<P> = SignerMiddleware<Provider<P>, LocalWallet>;

// ==================== CONNECTOR ====================

/// Hands out readers and signers bound to one registry deployment.
///
/// Generic over the JSON-RPC transport; production uses HTTP.
#[derive(Clone)]
pub struct EvmConnector<P = Http> {
    provider: Provider<P>,
    address: Address,
    chain_id: u64,
    private_key: Option<Zeroizing<String>>,
    confirmations: usize,
    poll_interval: Duration,
    history_from_block: u64,
}

impl EvmConnector<Http> {
    /// Build from validated configuration. No network access happens here.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.trim()).map_err(|e| ConfigError::Invalid {
            field: "rpc_url",
            reason: e.to_string(),
        })?;
        Self::with_provider(provider, config)
    }
}

impl<P: JsonRpcClient + Clone + 'static> EvmConnector<P> {
    /// Bind an existing provider; `config.rpc_url` is not used.
    pub fn with_provider(provider: Provider<P>, config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            provider: provider.interval(config.poll_interval()),
            address: config.contract_address()?,
            chain_id: config.chain_id,
            private_key: config.private_key.clone().map(Zeroizing::new),
            confirmations: config.confirmations.max(1),
            poll_interval: config.poll_interval(),
            history_from_block: config.history_from_block,
        })
    }

    pub fn contract_address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl<P: JsonRpcClient + Clone + 'static> LedgerConnector for EvmConnector<P> {
    type Reader = EvmReader<P>;
    type Writer = EvmWriter<P>;

    fn reader(&self) -> Result<EvmReader<P>, LedgerError> {
        Ok(EvmReader {
            contract: ConnectivityRegistry::new(self.address, Arc::new(self.provider.clone())),
            from_block: self.history_from_block,
        })
    }

    fn signer(&self) -> Result<EvmWriter<P>, AuthError> {
        let wallet = load_signer(self.private_key.as_deref().map(String::as_str), self.chain_id)?;
        let client = SignerMiddleware::new(self.provider.clone(), wallet);
        Ok(EvmWriter {
            contract: ConnectivityRegistry::new(self.address, Arc::new(client)),
            provider: Arc::new(self.provider.clone()),
            confirmations: self.confirmations,
            poll_interval: self.poll_interval,
        })
    }
}

// ==================== READS ====================

pub struct EvmReader<P = Http> {
    contract: ConnectivityRegistry<Provider<P>>,
    from_block: u64,
}

#[async_trait]
impl<P: JsonRpcClient + 'static> LedgerReader for EvmReader<P> {
    async fn get_latest_data(&self, entity_id: EntityId) -> Result<Option<MeasurementRecord>, LedgerError> {
        let (timestamp, download, upload, latency, data_hash) = self
            .contract
            .get_latest_data(entity_id)
            .call()
            .await
            .map_err(read_error)?;

        Ok(latest_from_response(
            entity_id,
            timestamp,
            download,
            upload,
            latency,
            Commitment::from(data_hash),
        ))
    }

    async fn query_data_submitted(&self, entity_id: EntityId) -> Result<Vec<DataSubmitted>, LedgerError> {
        let logs = self
            .contract
            .data_submitted_filter()
            .from_block(self.from_block)
            .topic1(entity_topic(entity_id))
            .query_with_meta()
            .await
            .map_err(read_error)?;

        debug!("Fetched {} DataSubmitted logs for school {}", logs.len(), entity_id);
        logs.into_iter().map(|(event, meta)| event_from_log(event, meta)).collect()
    }
}

/// Indexed `uint256` topic for a school id.
fn entity_topic(entity_id: EntityId) -> H256 {
    let mut word = [0u8; 32];
    entity_id.to_big_endian(&mut word);
    H256::from(word)
}

/// Map the `getLatestData` tuple to a record, or `None` when the contract
/// answered with its zero default.
pub fn latest_from_response(
    entity_id: EntityId,
    timestamp: U256,
    download: u32,
    upload: u32,
    latency: u32,
    commitment: Commitment,
) -> Option<MeasurementRecord> {
    if timestamp.is_zero() && download == 0 && upload == 0 && latency == 0 && commitment.is_zero() {
        return None;
    }
    let fields = MeasurementFields::new(entity_id, timestamp, download, upload, latency);
    Some(MeasurementRecord::from_stored(fields, commitment))
}

pub fn event_from_log(event: DataSubmittedFilter, meta: LogMeta) -> Result<DataSubmitted, LedgerError> {
    if meta.log_index > U256::from(u64::MAX) {
        return Err(LedgerError::Malformed(format!("log index {} out of range", meta.log_index)));
    }
    let fields = MeasurementFields::new(
        event.school_id,
        event.timestamp,
        event.download_speed,
        event.upload_speed,
        event.latency,
    );
    Ok(DataSubmitted {
        record: MeasurementRecord::from_stored(fields, Commitment::from(event.data_hash)),
        position: LedgerPosition {
            block_number: meta.block_number.as_u64(),
            log_index: meta.log_index.as_u64(),
            transaction_hash: meta.transaction_hash,
        },
    })
}

fn read_error<M: Middleware>(err: ContractError<M>) -> LedgerError {
    match err {
        ContractError::DecodingError(e) => LedgerError::Malformed(e.to_string()),
        ContractError::AbiError(e) => LedgerError::Malformed(e.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}

// ==================== WRITES ====================

pub struct EvmWriter<P = Http> {
    contract: ConnectivityRegistry<SigningClient<P>>,
    provider: Arc<Provider<P>>,
    confirmations: usize,
    poll_interval: Duration,
}

#[async_trait]
impl<P: JsonRpcClient + 'static> LedgerWriter for EvmWriter<P> {
    async fn submit_data(&self, record: &MeasurementRecord) -> Result<Box<dyn PendingSubmission>, LedgerError> {
        let f = &record.fields;
        let call = self.contract.submit_data(
            f.entity_id,
            f.timestamp,
            f.download_speed_mbps,
            f.upload_speed_mbps,
            f.latency_ms,
            record.commitment.to_bytes(),
        );

        let tx_hash = call
            .send()
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?
            .tx_hash();
        info!("Broadcast submitData tx {:#x}", tx_hash);

        Ok(Box::new(EvmPending {
            tx_hash,
            provider: Arc::clone(&self.provider),
            confirmations: self.confirmations,
            poll_interval: self.poll_interval,
        }))
    }
}

pub struct EvmPending<P = Http> {
    tx_hash: TxHash,
    provider: Arc<Provider<P>>,
    confirmations: usize,
    poll_interval: Duration,
}

#[async_trait]
impl<P: JsonRpcClient + 'static> PendingSubmission for EvmPending<P> {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn finalized(self: Box<Self>) -> Result<FinalityReceipt, LedgerError> {
        let receipt = PendingTransaction::new(self.tx_hash, self.provider.as_ref())
            .interval(self.poll_interval)
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        receipt_outcome(self.tx_hash, receipt)
    }
}

/// Classify the outcome of a finality wait.
pub fn receipt_outcome(tx_hash: TxHash, receipt: Option<TransactionReceipt>) -> Result<FinalityReceipt, LedgerError> {
    let receipt = receipt.ok_or(LedgerError::Dropped(tx_hash))?;
    if receipt.status == Some(U64::zero()) {
        return Err(LedgerError::Reverted(tx_hash));
    }
    let block_number = receipt
        .block_number
        .ok_or_else(|| LedgerError::Malformed(format!("receipt for {tx_hash:#x} has no block number")))?;
    Ok(FinalityReceipt {
        tx_hash,
        block_number: block_number.as_u64(),
    })
}
