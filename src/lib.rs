//! SchoolNet: submit school connectivity measurements to an append-only
//! ledger with a Keccak-256 commitment, and read them back verified.
//!
//! - [`crypto`]: canonical packed encoding and the commitment scheme.
//! - [`ledger`]: records, ledger interfaces, submission/query clients, verifier,
//!   and an in-memory ledger.
//! - [`wallet`]: configuration, signer, and the EVM contract adapter.

pub use schoolnet_core as ledger;
pub use schoolnet_crypto as crypto;
pub use schoolnet_wallet_core as wallet;

pub use schoolnet_core::{
    verify, ClientError, Latest, MeasurementRecord, MemoryLedger, QueryClient, SubmissionClient, Verification,
    VerifiedRecord,
};
pub use schoolnet_crypto::{commit, Commitment, CommitmentScheme, MeasurementFields};
pub use schoolnet_wallet_core::{connect, ClientConfig, EvmConnector};
