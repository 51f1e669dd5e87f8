//! Integrity verification of retrieved records.
//!
//! A mismatch is a value, not a fault: callers decide whether to display,
//! log, or discard it. Nothing is ever silently dropped or corrected here.

use schoolnet_crypto::{commit, Commitment};
use serde::{Deserialize, Serialize};

use crate::errors::IntegrityMismatch;
use crate::measurement::{LedgerPosition, MeasurementRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Valid,
    Tampered {
        stored: Commitment,
        recomputed: Commitment,
    },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// Recompute the commitment from the record's fields and compare it with the
/// stored one.
pub fn verify(record: &MeasurementRecord) -> Verification {
    let recomputed = commit(&record.fields);
    if recomputed == record.commitment {
        Verification::Valid
    } else {
        Verification::Tampered {
            stored: record.commitment,
            recomputed,
        }
    }
}

/// A record together with the outcome of verifying it. This is the only shape
/// in which the query layer hands records to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRecord {
    pub record: MeasurementRecord,
    pub verification: Verification,
    /// Emission position, present for records replayed from the event log.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position: Option<LedgerPosition>,
}

impl VerifiedRecord {
    pub fn check(record: MeasurementRecord) -> Self {
        Self {
            verification: verify(&record),
            record,
            position: None,
        }
    }

    pub fn check_at(record: MeasurementRecord, position: LedgerPosition) -> Self {
        Self {
            position: Some(position),
            ..Self::check(record)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.verification.is_valid()
    }

    /// Strict view: the record if valid, otherwise an [`IntegrityMismatch`].
    pub fn into_valid(self) -> Result<MeasurementRecord, IntegrityMismatch> {
        match self.verification {
            Verification::Valid => Ok(self.record),
            Verification::Tampered { stored, recomputed } => Err(IntegrityMismatch {
                entity_id: self.record.entity_id(),
                stored,
                recomputed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use schoolnet_crypto::{MeasurementFields, U256};

    fn sealed(e: u64, t: u64, d: u32, u: u32, l: u32) -> MeasurementRecord {
        MeasurementRecord::seal(MeasurementFields::normalize(e, t, d, u, l).unwrap())
    }

    #[test]
    fn test_sealed_record_is_valid() {
        let record = sealed(1, 1_700_000_000, 50, 10, 20);
        assert_eq!(verify(&record), Verification::Valid);
        assert!(VerifiedRecord::check(record).into_valid().is_ok());
    }

    #[test]
    fn test_latency_change_is_tampered() {
        let record = sealed(1, 1_700_000_000, 50, 10, 20);
        let mut forged = record;
        forged.fields.latency_ms += 1;

        match verify(&forged) {
            Verification::Tampered { stored, recomputed } => {
                assert_eq!(stored, record.commitment);
                assert_ne!(recomputed, stored);
            }
            Verification::Valid => panic!("forged record verified"),
        }
    }

    #[test]
    fn test_into_valid_surfaces_mismatch() {
        let mut record = sealed(9, 1, 1, 1, 1);
        record.commitment = Commitment::ZERO;

        let err = VerifiedRecord::check(record).into_valid().unwrap_err();
        assert_eq!(err.entity_id, U256::from(9u64));
        assert_eq!(err.stored, Commitment::ZERO);
        assert_eq!(err.recomputed, commit(&record.fields));
    }

    #[test]
    fn test_verification_serializes_with_status_tag() {
        let json = serde_json::to_value(Verification::Valid).unwrap();
        assert_eq!(json["status"], "valid");
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_valid(e in any::<u64>(), t in any::<u64>(), d in any::<u32>(), u in any::<u32>(), l in any::<u32>()) {
            prop_assert!(verify(&sealed(e, t, d, u, l)).is_valid());
        }

        #[test]
        fn prop_any_field_mutation_is_tampered(
            e in any::<u64>(), t in any::<u64>(), d in any::<u32>(), u in any::<u32>(), l in any::<u32>(),
            which in 0usize..5, delta in 1u32..1000,
        ) {
            let mut record = sealed(e, t, d, u, l);
            let f = &mut record.fields;
            match which {
                0 => f.entity_id = f.entity_id.overflowing_add(U256::from(delta)).0,
                1 => f.timestamp = f.timestamp.overflowing_add(U256::from(delta)).0,
                2 => f.download_speed_mbps = f.download_speed_mbps.wrapping_add(delta),
                3 => f.upload_speed_mbps = f.upload_speed_mbps.wrapping_add(delta),
                _ => f.latency_ms = f.latency_ms.wrapping_add(delta),
            }
            prop_assert!(!verify(&record).is_valid());
        }
    }
}
