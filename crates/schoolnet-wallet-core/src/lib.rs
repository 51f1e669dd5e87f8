pub mod config;
pub mod contract;
pub mod evm_ledger;
pub mod wallet_core;

pub use config::{ClientConfig, ConfigError, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use evm_ledger::{EvmConnector, EvmPending, EvmReader, EvmWriter};
pub use wallet_core::{load_signer, signer_address};

use log::info;
use schoolnet_core::{QueryClient, SubmissionClient};

/// Submission and query clients for the configured registry deployment.
pub fn connect(
    config: &ClientConfig,
) -> Result<(SubmissionClient<EvmConnector>, QueryClient<EvmConnector>), ConfigError> {
    let connector = EvmConnector::from_config(config)?;
    info!(
        "Using registry {:#x} on chain {} via {} ({})",
        connector.contract_address(),
        connector.chain_id(),
        config.rpc_url,
        if config.has_signer() { "signer configured" } else { "read-only" }
    );
    let submitter = SubmissionClient::new(connector.clone()).with_finality_timeout(config.finality_timeout());
    Ok((submitter, QueryClient::new(connector)))
}
