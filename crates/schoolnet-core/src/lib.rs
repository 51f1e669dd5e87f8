//! SchoolNet core: measurement records, ledger interfaces, and the
//! submission, query, and verification clients built on them.

pub mod errors;
pub mod ledger;
pub mod measurement;
pub mod memory_ledger;
pub mod query;
pub mod submission;
pub mod verifier;

pub use errors::{
    AuthError, ClientError, IntegrityMismatch, LedgerError, NotFinalizedReason, QueryError, SubmissionError,
};
pub use ledger::{FinalityReceipt, LedgerConnector, LedgerReader, LedgerWriter, PendingSubmission};
pub use measurement::{DataSubmitted, EntityId, LedgerPosition, MeasurementRecord};
pub use memory_ledger::MemoryLedger;
pub use query::{Latest, QueryClient};
pub use submission::{FinalizedSubmission, SubmissionClient, TransactionHandle, DEFAULT_FINALITY_TIMEOUT};
pub use verifier::{verify, Verification, VerifiedRecord};

pub use schoolnet_crypto::{Commitment, EncodingError, MeasurementFields, U256};
