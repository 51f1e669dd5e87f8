//! Canonical packed encoding of a measurement (the record minus its commitment).
//!
//! Layout, big-endian and tightly packed, 76 bytes:
//!
//! ```text
//! entity_id (32) || timestamp (32) || download_mbps (4) || upload_mbps (4) || latency_ms (4)
//! ```
//!
//! This is byte-for-byte what the contract side produces for
//! `abi.encodePacked(uint256, uint256, uint32, uint32, uint32)`.
//!
//! Every input is normalized to its fixed-width unsigned integer before it
//! reaches the encoder, so `"007"`, `"0x7"`, `7u64` and `U256::from(7)` all
//! encode identically.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width of a 256-bit ledger word in bytes.
pub const WORD_BYTES: usize = 32;

/// Width of a 32-bit metric in bytes.
pub const METRIC_BYTES: usize = 4;

/// Total length of a packed measurement.
pub const PACKED_LEN: usize = 2 * WORD_BYTES + 3 * METRIC_BYTES;

const TIMESTAMP_OFFSET: usize = WORD_BYTES;
const DOWNLOAD_OFFSET: usize = 2 * WORD_BYTES;
const UPLOAD_OFFSET: usize = DOWNLOAD_OFFSET + METRIC_BYTES;
const LATENCY_OFFSET: usize = UPLOAD_OFFSET + METRIC_BYTES;

// ==================== ERROR TYPES ====================

/// Positional fields of a packed measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    EntityId,
    Timestamp,
    DownloadSpeed,
    UploadSpeed,
    Latency,
}

impl Field {
    /// Layout order.
    pub const ALL: [Field; 5] = [
        Field::EntityId,
        Field::Timestamp,
        Field::DownloadSpeed,
        Field::UploadSpeed,
        Field::Latency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::EntityId => "entity_id",
            Field::Timestamp => "timestamp",
            Field::DownloadSpeed => "download_speed_mbps",
            Field::UploadSpeed => "upload_speed_mbps",
            Field::Latency => "latency_ms",
        }
    }

    pub fn bit_width(&self) -> u32 {
        match self {
            Field::EntityId | Field::Timestamp => 256,
            Field::DownloadSpeed | Field::UploadSpeed | Field::Latency => 32,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: Field, reason: String },

    #[error("field {field} overflows its {bits}-bit width")]
    Overflow { field: Field, bits: u32 },

    #[error("packed measurement must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid commitment: {0}")]
    InvalidCommitment(String),
}

impl EncodingError {
    /// The offending field, when the error is tied to one.
    pub fn field(&self) -> Option<Field> {
        match self {
            EncodingError::InvalidField { field, .. } | EncodingError::Overflow { field, .. } => {
                Some(*field)
            }
            _ => None,
        }
    }

    fn invalid(field: Field, reason: impl Into<String>) -> Self {
        EncodingError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    fn overflow(field: Field) -> Self {
        EncodingError::Overflow {
            field,
            bits: field.bit_width(),
        }
    }
}

// ==================== NORMALIZATION ====================

enum ParseFailure {
    Invalid(&'static str),
    Overflow,
}

/// Parses unsigned integer text: decimal (leading zeros allowed) or a
/// `0x`-prefixed hexadecimal literal. Surrounding whitespace is ignored.
fn parse_unsigned(text: &str) -> Result<U256, ParseFailure> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseFailure::Invalid("empty value"));
    }
    if text.starts_with('-') {
        return Err(ParseFailure::Invalid("negative values are not allowed"));
    }

    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseFailure::Invalid("not a hexadecimal integer"));
        }
        let significant = digits.trim_start_matches('0');
        if significant.len() > 2 * WORD_BYTES {
            return Err(ParseFailure::Overflow);
        }
        let padded = if significant.len() % 2 == 1 {
            format!("0{significant}")
        } else {
            significant.to_string()
        };
        let bytes = hex::decode(padded).map_err(|_| ParseFailure::Invalid("not a hexadecimal integer"))?;
        return Ok(U256::from_big_endian(&bytes));
    }

    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseFailure::Invalid("not a non-negative integer"));
    }

    let ten = U256::from(10u8);
    let mut acc = U256::zero();
    for digit in text.bytes().map(|b| b - b'0') {
        acc = acc
            .checked_mul(ten)
            .and_then(|v| v.checked_add(U256::from(digit)))
            .ok_or(ParseFailure::Overflow)?;
    }
    Ok(acc)
}

fn word_from_text(field: Field, text: &str) -> Result<U256, EncodingError> {
    parse_unsigned(text).map_err(|failure| match failure {
        ParseFailure::Invalid(reason) => EncodingError::invalid(field, reason),
        ParseFailure::Overflow => EncodingError::overflow(field),
    })
}

fn metric_from_word(field: Field, value: U256) -> Result<u32, EncodingError> {
    if value > U256::from(u32::MAX) {
        return Err(EncodingError::overflow(field));
    }
    Ok(value.as_u32())
}

/// Inputs accepted for the two 256-bit words (`entity_id`, `timestamp`).
pub trait IntoWord {
    fn into_word(self, field: Field) -> Result<U256, EncodingError>;
}

/// Inputs accepted for the three 32-bit metrics.
pub trait IntoMetric {
    fn into_metric(self, field: Field) -> Result<u32, EncodingError>;
}

impl IntoWord for U256 {
    fn into_word(self, _field: Field) -> Result<U256, EncodingError> {
        Ok(self)
    }
}

impl IntoWord for &str {
    fn into_word(self, field: Field) -> Result<U256, EncodingError> {
        word_from_text(field, self)
    }
}

impl IntoWord for &String {
    fn into_word(self, field: Field) -> Result<U256, EncodingError> {
        word_from_text(field, self)
    }
}

impl IntoWord for String {
    fn into_word(self, field: Field) -> Result<U256, EncodingError> {
        word_from_text(field, &self)
    }
}

macro_rules! unsigned_word {
    ($($t:ty),*) => {$(
        impl IntoWord for $t {
            fn into_word(self, _field: Field) -> Result<U256, EncodingError> {
                Ok(U256::from(self))
            }
        }
    )*};
}

macro_rules! signed_word {
    ($($t:ty),*) => {$(
        impl IntoWord for $t {
            fn into_word(self, field: Field) -> Result<U256, EncodingError> {
                if self < 0 {
                    return Err(EncodingError::invalid(field, "negative values are not allowed"));
                }
                Ok(U256::from(self.unsigned_abs()))
            }
        }
    )*};
}

unsigned_word!(u8, u16, u32, u64, u128, usize);
signed_word!(i32, i64, i128);

impl<T: IntoWord> IntoMetric for T {
    fn into_metric(self, field: Field) -> Result<u32, EncodingError> {
        metric_from_word(field, self.into_word(field)?)
    }
}

// ==================== CORE TYPES ====================

/// The five committed fields of a measurement, normalized to their
/// fixed-width representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementFields {
    pub entity_id: U256,
    pub timestamp: U256,
    pub download_speed_mbps: u32,
    pub upload_speed_mbps: u32,
    pub latency_ms: u32,
}

impl MeasurementFields {
    /// Build from already-typed values.
    pub fn new(
        entity_id: U256,
        timestamp: U256,
        download_speed_mbps: u32,
        upload_speed_mbps: u32,
        latency_ms: u32,
    ) -> Self {
        Self {
            entity_id,
            timestamp,
            download_speed_mbps,
            upload_speed_mbps,
            latency_ms,
        }
    }

    /// Validate and normalize loosely-typed input (text or integers).
    ///
    /// Fields are checked in layout order; the first bad field is reported.
    pub fn normalize(
        entity_id: impl IntoWord,
        timestamp: impl IntoWord,
        download_speed_mbps: impl IntoMetric,
        upload_speed_mbps: impl IntoMetric,
        latency_ms: impl IntoMetric,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            entity_id: entity_id.into_word(Field::EntityId)?,
            timestamp: timestamp.into_word(Field::Timestamp)?,
            download_speed_mbps: download_speed_mbps.into_metric(Field::DownloadSpeed)?,
            upload_speed_mbps: upload_speed_mbps.into_metric(Field::UploadSpeed)?,
            latency_ms: latency_ms.into_metric(Field::Latency)?,
        })
    }

    /// Packed canonical bytes.
    pub fn encode_packed(&self) -> [u8; PACKED_LEN] {
        let mut out = [0u8; PACKED_LEN];
        self.entity_id.to_big_endian(&mut out[..TIMESTAMP_OFFSET]);
        self.timestamp
            .to_big_endian(&mut out[TIMESTAMP_OFFSET..DOWNLOAD_OFFSET]);
        out[DOWNLOAD_OFFSET..UPLOAD_OFFSET].copy_from_slice(&self.download_speed_mbps.to_be_bytes());
        out[UPLOAD_OFFSET..LATENCY_OFFSET].copy_from_slice(&self.upload_speed_mbps.to_be_bytes());
        out[LATENCY_OFFSET..].copy_from_slice(&self.latency_ms.to_be_bytes());
        out
    }
}

/// Parse a single entity id, e.g. for a read-only lookup.
pub fn parse_entity_id(text: &str) -> Result<U256, EncodingError> {
    word_from_text(Field::EntityId, text)
}

/// Encode the five fields into the canonical packed layout.
pub fn encode(fields: &MeasurementFields) -> [u8; PACKED_LEN] {
    fields.encode_packed()
}

/// Inverse of [`encode`] over exactly [`PACKED_LEN`] bytes.
pub fn decode(bytes: &[u8]) -> Result<MeasurementFields, EncodingError> {
    if bytes.len() != PACKED_LEN {
        return Err(EncodingError::InvalidLength {
            expected: PACKED_LEN,
            actual: bytes.len(),
        });
    }

    let metric = |offset: usize| {
        let mut buf = [0u8; METRIC_BYTES];
        buf.copy_from_slice(&bytes[offset..offset + METRIC_BYTES]);
        u32::from_be_bytes(buf)
    };

    Ok(MeasurementFields {
        entity_id: U256::from_big_endian(&bytes[..TIMESTAMP_OFFSET]),
        timestamp: U256::from_big_endian(&bytes[TIMESTAMP_OFFSET..DOWNLOAD_OFFSET]),
        download_speed_mbps: metric(DOWNLOAD_OFFSET),
        upload_speed_mbps: metric(UPLOAD_OFFSET),
        latency_ms: metric(LATENCY_OFFSET),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario() -> MeasurementFields {
        MeasurementFields::normalize(1u64, 1_700_000_000u64, 50u32, 10u32, 20u32).unwrap()
    }

    #[test]
    fn test_packed_layout_matches_abi_encode_packed() {
        let expected = "0000000000000000000000000000000000000000000000000000000000000001\
                        000000000000000000000000000000000000000000000000000000006553f100\
                        00000032\
                        0000000a\
                        00000014";
        let packed = encode(&scenario());
        assert_eq!(packed.len(), PACKED_LEN);
        assert_eq!(PACKED_LEN, 76);
        assert_eq!(hex::encode(packed), expected);
    }

    #[test]
    fn test_text_and_numeric_inputs_normalize_identically() {
        let numeric = scenario();
        let text = MeasurementFields::normalize("1", "1700000000", "50", "10", "20").unwrap();
        let padded = MeasurementFields::normalize(" 0001 ", "001700000000", "050", "0x0a", "0X14").unwrap();
        let hex_ids = MeasurementFields::normalize("0x1", "0x6553f100", 50i64, 10i32, 20u64).unwrap();

        assert_eq!(numeric, text);
        assert_eq!(numeric, padded);
        assert_eq!(numeric, hex_ids);
        assert_eq!(encode(&numeric), encode(&padded));
    }

    #[test]
    fn test_negative_entity_id_is_rejected() {
        let err = MeasurementFields::normalize("-1", "1", "1", "1", "1").unwrap_err();
        assert_eq!(err.field(), Some(Field::EntityId));
        assert!(matches!(err, EncodingError::InvalidField { .. }));

        let err = MeasurementFields::normalize(-5i64, 1u64, 1u32, 1u32, 1u32).unwrap_err();
        assert_eq!(err.field(), Some(Field::EntityId));
    }

    #[test]
    fn test_non_numeric_inputs_are_rejected() {
        for bad in ["", "   ", "abc", "1.5", "1e3", "+1", "0x", "0xzz", "12 34"] {
            let err = MeasurementFields::normalize(bad, "1", "1", "1", "1").unwrap_err();
            assert_eq!(err.field(), Some(Field::EntityId), "input {bad:?}");
        }
    }

    #[test]
    fn test_first_bad_field_is_reported() {
        let err = MeasurementFields::normalize("1", "2", "3", "oops", "-4").unwrap_err();
        assert_eq!(err.field(), Some(Field::UploadSpeed));
    }

    #[test]
    fn test_metric_overflow() {
        let max = MeasurementFields::normalize("1", "1", "4294967295", "0", "0").unwrap();
        assert_eq!(max.download_speed_mbps, u32::MAX);

        let err = MeasurementFields::normalize("1", "1", "4294967296", "0", "0").unwrap_err();
        assert_eq!(
            err,
            EncodingError::Overflow {
                field: Field::DownloadSpeed,
                bits: 32
            }
        );

        let err = MeasurementFields::normalize(1u64, 1u64, 0u32, 0u32, u64::MAX).unwrap_err();
        assert_eq!(err.field(), Some(Field::Latency));
    }

    #[test]
    fn test_word_overflow() {
        let max_word = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let fields = MeasurementFields::normalize(max_word, "0", "0", "0", "0").unwrap();
        assert_eq!(fields.entity_id, U256::MAX);

        let too_big = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        let err = MeasurementFields::normalize(too_big, "0", "0", "0", "0").unwrap_err();
        assert_eq!(
            err,
            EncodingError::Overflow {
                field: Field::EntityId,
                bits: 256
            }
        );

        let too_wide_hex = format!("0x1{}", "0".repeat(64));
        let err = MeasurementFields::normalize("0", too_wide_hex.as_str(), "0", "0", "0").unwrap_err();
        assert_eq!(err.field(), Some(Field::Timestamp));
    }

    #[test]
    fn test_zero_is_valid_everywhere() {
        let zero = MeasurementFields::normalize("0", "0", "0", "0", "0").unwrap();
        assert_eq!(encode(&zero), [0u8; PACKED_LEN]);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode(&[0u8; PACKED_LEN - 1]).unwrap_err();
        assert_eq!(
            err,
            EncodingError::InvalidLength {
                expected: 76,
                actual: 75
            }
        );
        assert!(decode(&[0u8; PACKED_LEN + 1]).is_err());
    }

    #[test]
    fn test_decode_recovers_fields() {
        let fields = scenario();
        assert_eq!(decode(&encode(&fields)).unwrap(), fields);
    }

    proptest! {
        #[test]
        fn prop_decimal_text_matches_numeric(e in any::<u128>(), t in any::<u64>(), d in any::<u32>(), u in any::<u32>(), l in any::<u32>()) {
            let numeric = MeasurementFields::normalize(e, t, d, u, l).unwrap();
            let text = MeasurementFields::normalize(
                e.to_string(), format!("000{t}"), d.to_string(), u.to_string(), l.to_string(),
            ).unwrap();
            prop_assert_eq!(encode(&numeric), encode(&text));
        }
    }
}
