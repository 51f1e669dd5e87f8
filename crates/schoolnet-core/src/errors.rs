//! Error taxonomy.
//!
//! Each kind is its own type so callers can tell input-validation failures,
//! signer problems, ledger write failures, read failures, and integrity
//! failures apart. [`ClientError`] unifies them for `?` without erasing the kind.

use ethers_core::types::TxHash;
use schoolnet_crypto::{Commitment, EncodingError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::measurement::EntityId;

/// No signing capability could be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),
}

/// Why a broadcast transaction did not reach finality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFinalizedReason {
    TimedOut(Duration),
    Reverted(TxHash),
    Dropped(TxHash),
    Unconfirmed(String),
}

impl fmt::Display for NotFinalizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFinalizedReason::TimedOut(after) => {
                write!(f, "finality wait timed out after {}s", after.as_secs_f64())
            }
            NotFinalizedReason::Reverted(tx) => write!(f, "transaction {tx:#x} reverted"),
            NotFinalizedReason::Dropped(tx) => {
                write!(f, "transaction {tx:#x} was dropped before inclusion")
            }
            NotFinalizedReason::Unconfirmed(reason) => {
                write!(f, "confirmation could not be observed: {reason}")
            }
        }
    }
}

/// The ledger rejected a submission or it failed to finalize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("ledger rejected submission: {0}")]
    Rejected(String),

    #[error("submission not finalized: {0}")]
    NotFinalized(NotFinalizedReason),
}

/// A read against the ledger failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("ledger read failed: {0}")]
    Transport(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

/// A retrieved record whose recomputed commitment disagrees with the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("integrity mismatch for school {entity_id}: stored {stored}, recomputed {recomputed}")]
pub struct IntegrityMismatch {
    pub entity_id: EntityId,
    pub stored: Commitment,
    pub recomputed: Commitment,
}

/// Failures reported by a ledger backend, before they are classified by
/// the client that observed them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transaction {0:#x} reverted")]
    Reverted(TxHash),

    #[error("transaction {0:#x} dropped")]
    Dropped(TxHash),

    #[error("transport: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<LedgerError> for SubmissionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(reason) => SubmissionError::Rejected(reason),
            LedgerError::Reverted(tx) => SubmissionError::NotFinalized(NotFinalizedReason::Reverted(tx)),
            LedgerError::Dropped(tx) => SubmissionError::NotFinalized(NotFinalizedReason::Dropped(tx)),
            LedgerError::Transport(reason) | LedgerError::Malformed(reason) => {
                SubmissionError::NotFinalized(NotFinalizedReason::Unconfirmed(reason))
            }
        }
    }
}

impl From<LedgerError> for QueryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Malformed(reason) => QueryError::Malformed(reason),
            other => QueryError::Transport(other.to_string()),
        }
    }
}

/// Any failure surfaced by the client layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error(transparent)]
    Integrity(#[from] IntegrityMismatch),
}

impl ClientError {
    /// Stable short name of the error kind, for logs and exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Encoding(_) => "EncodingError",
            ClientError::Auth(_) => "AuthError",
            ClientError::Submission(_) => "SubmissionError",
            ClientError::Query(_) => "QueryError",
            ClientError::Integrity(_) => "IntegrityMismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_classify_for_submission() {
        let tx = TxHash::repeat_byte(0xab);
        assert_eq!(
            SubmissionError::from(LedgerError::Rejected("nonce too low".into())),
            SubmissionError::Rejected("nonce too low".into())
        );
        assert_eq!(
            SubmissionError::from(LedgerError::Reverted(tx)),
            SubmissionError::NotFinalized(NotFinalizedReason::Reverted(tx))
        );
        assert!(matches!(
            SubmissionError::from(LedgerError::Transport("connection reset".into())),
            SubmissionError::NotFinalized(NotFinalizedReason::Unconfirmed(_))
        ));
    }

    #[test]
    fn test_ledger_errors_classify_for_query() {
        assert_eq!(
            QueryError::from(LedgerError::Malformed("short log".into())),
            QueryError::Malformed("short log".into())
        );
        assert!(matches!(
            QueryError::from(LedgerError::Transport("timeout".into())),
            QueryError::Transport(_)
        ));
    }

    #[test]
    fn test_kinds_are_distinguishable() {
        let errors: Vec<ClientError> = vec![
            EncodingError::InvalidCommitment("x".into()).into(),
            AuthError::SignerUnavailable("no key".into()).into(),
            SubmissionError::Rejected("bad".into()).into(),
            QueryError::Transport("down".into()).into(),
            IntegrityMismatch {
                entity_id: EntityId::from(1u64),
                stored: Commitment::ZERO,
                recomputed: Commitment::ZERO,
            }
            .into(),
        ];
        let kinds: Vec<_> = errors.iter().map(ClientError::kind).collect();
        assert_eq!(
            kinds,
            ["EncodingError", "AuthError", "SubmissionError", "QueryError", "IntegrityMismatch"]
        );
    }

    #[test]
    fn test_reverted_message_names_transaction() {
        let tx = TxHash::repeat_byte(0x01);
        let msg = SubmissionError::NotFinalized(NotFinalizedReason::Reverted(tx)).to_string();
        assert!(msg.contains("0x0101"));
        assert!(msg.contains("reverted"));
    }
}
