/// Measurement Commitments
///
/// A commitment binds the five measurement fields together so that any later
/// change to a stored record is detectable.
///
/// SAFETY GUARANTEES:
/// - Deterministic: identical fields always give the identical commitment
/// - Bit-for-bit agreement with the contract's `keccak256(abi.encodePacked(..))`
/// - Changing the hash function or byte layout is a breaking format change and
///   must be introduced as a new `CommitmentScheme` variant

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::codec::{EncodingError, MeasurementFields};

/// Digest width in bytes.
pub const COMMITMENT_LEN: usize = 32;

// ==================== HASHER ====================

/// Keccak-256 (original padding, as used natively by the ledger).
pub fn keccak256(bytes: &[u8]) -> [u8; COMMITMENT_LEN] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let hash_result = hasher.finalize();
    let mut hash = [0u8; COMMITMENT_LEN];
    hash.copy_from_slice(&hash_result);
    hash
}

/// Hash already-encoded bytes into a commitment.
pub fn hash(bytes: &[u8]) -> Commitment {
    Commitment(keccak256(bytes))
}

/// Commit to a measurement under the current scheme.
pub fn commit(fields: &MeasurementFields) -> Commitment {
    CommitmentScheme::CURRENT.commit(fields)
}

// ==================== SCHEME VERSIONING ====================

/// Versioned definition of "what a commitment means".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitmentScheme {
    /// `keccak256(entity_id:u256 || timestamp:u256 || download:u32 || upload:u32 || latency:u32)`
    PackedKeccak256V1,
}

impl CommitmentScheme {
    pub const CURRENT: CommitmentScheme = CommitmentScheme::PackedKeccak256V1;

    pub fn commit(&self, fields: &MeasurementFields) -> Commitment {
        match self {
            CommitmentScheme::PackedKeccak256V1 => hash(&fields.encode_packed()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommitmentScheme::PackedKeccak256V1 => "packed-keccak256-v1",
        }
    }
}

impl fmt::Display for CommitmentScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ==================== COMMITMENT ====================

/// A 32-byte integrity tag, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Commitment(pub [u8; COMMITMENT_LEN]);

impl Commitment {
    pub const ZERO: Commitment = Commitment([0u8; COMMITMENT_LEN]);

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_LEN] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; COMMITMENT_LEN] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; COMMITMENT_LEN]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Accepts 64 hex digits with or without a `0x` prefix.
    pub fn from_hex(text: &str) -> Result<Self, EncodingError> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.len() != 2 * COMMITMENT_LEN {
            return Err(EncodingError::InvalidCommitment(format!(
                "expected {} hex digits, got {}",
                2 * COMMITMENT_LEN,
                digits.len()
            )));
        }
        let mut out = [0u8; COMMITMENT_LEN];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| EncodingError::InvalidCommitment(e.to_string()))?;
        Ok(Commitment(out))
    }
}

impl From<[u8; COMMITMENT_LEN]> for Commitment {
    fn from(bytes: [u8; COMMITMENT_LEN]) -> Self {
        Commitment(bytes)
    }
}

impl From<Commitment> for [u8; COMMITMENT_LEN] {
    fn from(commitment: Commitment) -> Self {
        commitment.0
    }
}

impl FromStr for Commitment {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Commitment::from_hex(s)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Commitment::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MeasurementFields;
    use proptest::prelude::*;

    const SCENARIO_COMMITMENT: &str =
        "0x2f1af810d4bf81bca1968270fe4747a69a1bbea0192fcc3797cc84622f5296fe";

    fn tiny_keccak256(bytes: &[u8]) -> [u8; 32] {
        use tiny_keccak::{Hasher, Keccak};
        let mut keccak = Keccak::v256();
        let mut out = [0u8; 32];
        keccak.update(bytes);
        keccak.finalize(&mut out);
        out
    }

    #[test]
    fn test_keccak_known_vectors() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(keccak256(b"abc")),
            "4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
    }

    #[test]
    fn test_scenario_commitment_vector() {
        let fields = MeasurementFields::normalize(1u64, 1_700_000_000u64, 50u32, 10u32, 20u32).unwrap();
        assert_eq!(commit(&fields).to_hex(), SCENARIO_COMMITMENT);
    }

    #[test]
    fn test_all_zero_fields_have_nonzero_commitment() {
        let zero = MeasurementFields::normalize(0u64, 0u64, 0u32, 0u32, 0u32).unwrap();
        let commitment = commit(&zero);
        assert!(!commitment.is_zero());
        assert_eq!(
            commitment.to_hex(),
            "0xdff4c3682adc47c34a7d4e71e6d433ccc3cee8960cc8356979f56e9ca61a63c0"
        );
    }

    #[test]
    fn test_hex_parsing() {
        let parsed: Commitment = SCENARIO_COMMITMENT.parse().unwrap();
        assert_eq!(parsed.to_hex(), SCENARIO_COMMITMENT);

        let unprefixed = Commitment::from_hex(&SCENARIO_COMMITMENT[2..]).unwrap();
        assert_eq!(parsed, unprefixed);

        assert!(Commitment::from_hex("0x1234").is_err());
        assert!(Commitment::from_hex(&format!("0x{}", "zz".repeat(32))).is_err());
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let commitment = Commitment::from_hex(SCENARIO_COMMITMENT).unwrap();
        let json = serde_json::to_string(&commitment).unwrap();
        assert_eq!(json, format!("\"{SCENARIO_COMMITMENT}\""));
        let back: Commitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commitment);
    }

    #[test]
    fn test_scheme_name_is_stable() {
        assert_eq!(CommitmentScheme::CURRENT.name(), "packed-keccak256-v1");
    }

    proptest! {
        #[test]
        fn prop_matches_independent_keccak(data in proptest::collection::vec(any::<u8>(), 0..300)) {
            prop_assert_eq!(keccak256(&data), tiny_keccak256(&data));
        }

        #[test]
        fn prop_commit_is_deterministic(e in any::<u64>(), t in any::<u64>(), d in any::<u32>(), u in any::<u32>(), l in any::<u32>()) {
            let fields = MeasurementFields::normalize(e, t, d, u, l).unwrap();
            prop_assert_eq!(commit(&fields), commit(&fields));
            prop_assert_eq!(commit(&fields), hash(&fields.encode_packed()));
        }

        #[test]
        fn prop_single_field_change_changes_commitment(
            e in any::<u64>(), t in any::<u64>(), d in any::<u32>(), u in any::<u32>(), l in any::<u32>(),
            which in 0usize..5,
        ) {
            let original = MeasurementFields::normalize(e, t, d, u, l).unwrap();
            let mut changed = original;
            match which {
                0 => changed.entity_id = changed.entity_id.overflowing_add(1u64.into()).0,
                1 => changed.timestamp = changed.timestamp.overflowing_add(1u64.into()).0,
                2 => changed.download_speed_mbps = changed.download_speed_mbps.wrapping_add(1),
                3 => changed.upload_speed_mbps = changed.upload_speed_mbps.wrapping_add(1),
                _ => changed.latency_ms = changed.latency_ms.wrapping_add(1),
            }
            prop_assert_ne!(commit(&original), commit(&changed));
        }
    }
}
