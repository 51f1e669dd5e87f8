pub mod codec;
pub mod commitment;

pub use codec::{
    decode, encode, parse_entity_id, EncodingError, Field, IntoMetric, IntoWord, MeasurementFields,
    PACKED_LEN,
};
pub use commitment::{commit, hash, keccak256, Commitment, CommitmentScheme, COMMITMENT_LEN};

/// 256-bit ledger word, re-exported so downstream crates share one integer type.
pub use ethers_core::types::U256;
