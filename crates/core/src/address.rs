//! SS58 address codec.
//!
//! Text form: `base58(format_bytes || payload || checksum)` where the checksum
//! is the first `K` bytes of `blake2b-512("SS58PRE" || format_bytes || payload)`
//! and `K` depends on the payload length.
//!
//! Formats below 64 take one byte; formats 64..=16383 take two.
//! Formats 46 and 47 are reserved and rejected both ways.

use blake2::{Blake2b512, Digest};
use thiserror::Error;

use crate::error::DomainError;
use crate::models::AccountId;

const CHECKSUM_PREFIX: &[u8] = b"SS58PRE";

/// Formats that must never be encoded or accepted.
pub const RESERVED_FORMATS: [u16; 2] = [46, 47];

/// Highest representable address format.
pub const MAX_FORMAT: u16 = 16383;

/// Address codec failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("format {0} is reserved")]
    ReservedFormat(u16),

    #[error("format {0} is out of range")]
    FormatOutOfRange(u16),

    #[error("unsupported payload length {0}")]
    UnsupportedLength(usize),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("expected format {expected}, found {found}")]
    FormatMismatch { expected: u16, found: u16 },
}

impl From<AddressError> for DomainError {
    fn from(err: AddressError) -> Self {
        DomainError::InvalidAddress(err.to_string())
    }
}

fn check_format(format: u16) -> Result<(), AddressError> {
    if format > MAX_FORMAT {
        return Err(AddressError::FormatOutOfRange(format));
    }
    if RESERVED_FORMATS.contains(&format) {
        return Err(AddressError::ReservedFormat(format));
    }
    Ok(())
}

fn format_bytes(format: u16) -> Vec<u8> {
    if format < 64 {
        vec![format as u8]
    } else {
        vec![
            (((format & 0b1111_1100) >> 2) as u8) | 0b0100_0000,
            ((format >> 8) as u8) | (((format & 0b11) as u8) << 6),
        ]
    }
}

fn checksum(data: &[u8]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(data);
    hasher.finalize().into()
}

/// Checksum length when encoding a payload of `len` bytes.
fn encode_checksum_len(len: usize) -> Result<usize, AddressError> {
    match len {
        1 | 2 | 4 | 8 => Ok(1),
        32 | 33 => Ok(2),
        other => Err(AddressError::UnsupportedLength(other)),
    }
}

/// Checksum length from the total decoded length and the format width.
///
/// Keyed on the bytes after the format prefix so every payload width
/// decodes under one- and two-byte formats alike.
fn decode_checksum_len(total: usize, format_len: usize) -> Result<usize, AddressError> {
    match total.saturating_sub(format_len) {
        2 | 3 | 5 | 9 => Ok(1),
        4 | 6 | 10 => Ok(2),
        7 | 11 => Ok(3),
        8 | 12 => Ok(4),
        13 => Ok(5),
        14 => Ok(6),
        15 => Ok(7),
        16 => Ok(8),
        34 | 35 => Ok(2),
        _ => Err(AddressError::UnsupportedLength(total)),
    }
}

/// Encode a raw payload under an address format.
pub fn encode(payload: &[u8], format: u16) -> Result<String, AddressError> {
    check_format(format)?;
    let checksum_len = encode_checksum_len(payload.len())?;

    let mut data = format_bytes(format);
    data.extend_from_slice(payload);
    let hash = checksum(&data);
    data.extend_from_slice(&hash[..checksum_len]);

    Ok(bs58::encode(data).into_string())
}

/// Decode text into `(format, payload)`, verifying the checksum.
///
/// With `expected_format` set, a different format is an error.
pub fn decode(text: &str, expected_format: Option<u16>) -> Result<(u16, Vec<u8>), AddressError> {
    let data = bs58::decode(text)
        .into_vec()
        .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
    if data.len() < 2 {
        return Err(AddressError::UnsupportedLength(data.len()));
    }

    let (format, format_len) = if data[0] & 0b0100_0000 != 0 {
        let lower = (u16::from(data[0] & 0b0011_1111) << 2) | u16::from(data[1] >> 6);
        let upper = u16::from(data[1] & 0b0011_1111);
        (lower | (upper << 8), 2)
    } else {
        (u16::from(data[0]), 1)
    };
    check_format(format)?;

    if let Some(expected) = expected_format
        && expected != format
    {
        return Err(AddressError::FormatMismatch {
            expected,
            found: format,
        });
    }

    let checksum_len = decode_checksum_len(data.len(), format_len)?;
    let body_end = data.len() - checksum_len;
    let hash = checksum(&data[..body_end]);
    if hash[..checksum_len] != data[body_end..] {
        return Err(AddressError::ChecksumMismatch);
    }

    Ok((format, data[format_len..body_end].to_vec()))
}

/// Little-endian bytes of an account index at its minimal width (1, 2, 4 or 8).
fn index_payload(index: u64) -> Vec<u8> {
    if let Ok(v) = u8::try_from(index) {
        vec![v]
    } else if let Ok(v) = u16::try_from(index) {
        v.to_le_bytes().to_vec()
    } else if let Ok(v) = u32::try_from(index) {
        v.to_le_bytes().to_vec()
    } else {
        index.to_le_bytes().to_vec()
    }
}

/// Codec bound to one address format, built once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ss58Codec {
    format: u16,
}

impl Ss58Codec {
    pub fn new(format: u16) -> Result<Self, AddressError> {
        check_format(format)?;
        Ok(Self { format })
    }

    pub fn format(&self) -> u16 {
        self.format
    }

    /// Render an account identifier.
    pub fn encode_account(&self, account: &AccountId) -> String {
        // 32-byte payloads and validated formats cannot fail.
        encode(account.as_bytes(), self.format).unwrap_or_else(|_| account.to_hex())
    }

    /// Render an account index as a short address.
    pub fn encode_index(&self, index: u64) -> String {
        encode(&index_payload(index), self.format).unwrap_or_else(|_| index.to_string())
    }

    /// Parse an account address in this codec's format.
    pub fn decode_account(&self, text: &str) -> Result<AccountId, AddressError> {
        let (_, payload) = decode(text, Some(self.format))?;
        let len = payload.len();
        let bytes: [u8; 32] = payload
            .try_into()
            .map_err(|_| AddressError::UnsupportedLength(len))?;
        Ok(AccountId(bytes))
    }
}

impl Default for Ss58Codec {
    fn default() -> Self {
        Self { format: 42 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    fn alice() -> AccountId {
        AccountId::from_hex(ALICE).unwrap()
    }

    // Vecteurs connus: Alice en format générique (42) et Polkadot (0)
    #[test]
    fn test_known_vectors() {
        assert_eq!(
            encode(alice().as_bytes(), 42).unwrap(),
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        );
        assert_eq!(
            encode(alice().as_bytes(), 0).unwrap(),
            "15oF4uVJwmo4TdGW7VfQxNLavjCXviqxT9S1MgbjMNHr6Sp5"
        );
    }

    // Test critique: decode(encode(id, f)) == id
    #[test]
    fn test_roundtrip_across_format_widths() {
        let ids = [[0u8; 32], [0xff; 32], *alice().as_bytes()];
        for format in [0u16, 2, 42, 63, 64, 255, 1000, 16383] {
            for id in &ids {
                let text = encode(id, format).unwrap();
                let (found, payload) = decode(&text, None).unwrap();
                assert_eq!(found, format);
                assert_eq!(payload, id.to_vec());
            }
        }
    }

    #[test]
    fn test_roundtrip_33_byte_payload() {
        let payload = [0x02u8; 33];
        let text = encode(&payload, 42).unwrap();
        assert_eq!(decode(&text, Some(42)).unwrap().1, payload.to_vec());
    }

    #[test]
    fn test_reserved_formats_rejected() {
        assert_eq!(
            encode(alice().as_bytes(), 46),
            Err(AddressError::ReservedFormat(46))
        );
        assert_eq!(
            encode(alice().as_bytes(), 47),
            Err(AddressError::ReservedFormat(47))
        );
        assert_eq!(
            encode(alice().as_bytes(), 16384),
            Err(AddressError::FormatOutOfRange(16384))
        );
        assert!(Ss58Codec::new(46).is_err());
    }

    // Test critique: un caractère modifié casse le checksum
    #[test]
    fn test_corrupted_checksum_rejected() {
        let text = encode(alice().as_bytes(), 42).unwrap();
        let mut data = bs58::decode(&text).into_vec().unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x01;
        let corrupted = bs58::encode(data).into_string();
        assert_eq!(decode(&corrupted, None), Err(AddressError::ChecksumMismatch));
    }

    #[test]
    fn test_expected_format_enforced() {
        let text = encode(alice().as_bytes(), 0).unwrap();
        assert_eq!(
            decode(&text, Some(42)),
            Err(AddressError::FormatMismatch {
                expected: 42,
                found: 0
            })
        );
    }

    #[test]
    fn test_account_index_minimal_width() {
        assert_eq!(index_payload(5), vec![5]);
        assert_eq!(index_payload(300), 300u16.to_le_bytes().to_vec());
        assert_eq!(index_payload(70_000), 70_000u32.to_le_bytes().to_vec());
        assert_eq!(index_payload(1 << 40), (1u64 << 40).to_le_bytes().to_vec());

        let codec = Ss58Codec::default();
        for index in [0u64, 255, 256, 65_536, 1 << 40] {
            let text = codec.encode_index(index);
            let (_, payload) = decode(&text, Some(42)).unwrap();
            assert_eq!(payload, index_payload(index));
        }
    }

    // Test critique: les index courts se relisent aussi avec un format sur deux octets
    #[test]
    fn test_account_index_roundtrip_across_format_widths() {
        for format in [0u16, 42, 63, 64, 255, 16383] {
            let codec = Ss58Codec::new(format).unwrap();
            for index in [7u64, 300, 70_000, 1 << 40] {
                let text = codec.encode_index(index);
                let (found, payload) = decode(&text, Some(format)).unwrap();
                assert_eq!(found, format);
                assert_eq!(payload, index_payload(index), "format {format} index {index}");
            }
        }
    }

    #[test]
    fn test_codec_account_roundtrip() {
        let codec = Ss58Codec::new(42).unwrap();
        let text = codec.encode_account(&alice());
        assert_eq!(codec.decode_account(&text).unwrap(), alice());
    }
}
