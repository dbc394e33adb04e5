//! Shared helper functions for PostgreSQL row conversion.

use chronicle_core::error::{StorageError, StorageResult};
use chronicle_core::models::{AccountId, EventPhase};

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Convert a `Vec<u8>` to a 32-byte array, rejecting all-zero values as corrupt.
///
/// Used for block hashes, where all-zeros indicates data corruption.
pub fn bytes_to_hash32_strict(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    let arr = bytes_to_hash32(bytes, field_name)?;

    if arr == [0u8; 32] {
        return Err(StorageError::SerializationError(format!(
            "{} is all zeros, which indicates data corruption",
            field_name
        )));
    }

    Ok(arr)
}

pub fn bytes_to_account(bytes: Vec<u8>, field_name: &str) -> StorageResult<AccountId> {
    bytes_to_hash32(bytes, field_name).map(AccountId)
}

pub fn bytes_to_optional_account(
    bytes: Option<Vec<u8>>,
    field_name: &str,
) -> StorageResult<Option<AccountId>> {
    bytes.map(|b| bytes_to_account(b, field_name)).transpose()
}

/// Parse a `NUMERIC` column selected as text.
///
/// Amounts are bound as strings and cast with `$n::NUMERIC`, and read back
/// with `col::TEXT`.
pub fn numeric_to_u128(text: Option<String>, field_name: &str) -> StorageResult<Option<u128>> {
    text.map(|t| {
        t.parse::<u128>().map_err(|e| {
            StorageError::SerializationError(format!("{} is not a u128 ({}): {}", field_name, t, e))
        })
    })
    .transpose()
}

pub fn u128_to_numeric(value: Option<u128>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// Store an event phase as a tag plus the optional extrinsic index.
pub fn phase_to_columns(phase: EventPhase) -> (&'static str, Option<i32>) {
    match phase {
        EventPhase::ApplyExtrinsic(idx) => ("apply_extrinsic", Some(idx as i32)),
        EventPhase::Finalization => ("finalization", None),
        EventPhase::Initialization => ("initialization", None),
    }
}

pub fn phase_from_columns(tag: &str, extrinsic_idx: Option<i32>) -> StorageResult<EventPhase> {
    match (tag, extrinsic_idx) {
        ("apply_extrinsic", Some(idx)) => Ok(EventPhase::ApplyExtrinsic(idx as u32)),
        ("finalization", _) => Ok(EventPhase::Finalization),
        ("initialization", _) => Ok(EventPhase::Initialization),
        _ => Err(StorageError::SerializationError(format!(
            "invalid event phase: {} ({:?})",
            tag, extrinsic_idx
        ))),
    }
}

/// Map a sqlx error raised by a query.
///
/// Unique and foreign key violations point at a sequencing bug rather than
/// a flaky database, so they get their own variant.
pub fn query_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            StorageError::ConstraintViolation(e.to_string())
        }
        _ => StorageError::QueryError(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: détecte les données corrompues (all zeros = hash invalide)
    #[test]
    fn test_strict_rejects_zero_hash() {
        let zeros = vec![0u8; 32];
        let result = bytes_to_hash32_strict(zeros, "block.hash");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("corruption"));
    }

    // Test critique: erreurs incluent le nom du champ pour debug
    #[test]
    fn test_error_includes_field_name() {
        let bad_bytes = vec![1u8; 16];
        let result = bytes_to_hash32(bad_bytes, "block.parent_hash");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("block.parent_hash"));
        assert!(err.contains("expected 32"));
    }

    #[test]
    fn test_numeric_parses_full_u128_range() {
        let max = u128::MAX.to_string();
        assert_eq!(
            numeric_to_u128(Some(max), "amount").unwrap(),
            Some(u128::MAX)
        );
        assert_eq!(numeric_to_u128(None, "amount").unwrap(), None);
        assert!(numeric_to_u128(Some("1.5".into()), "amount").is_err());
    }

    #[test]
    fn test_phase_columns_roundtrip() {
        for phase in [
            EventPhase::ApplyExtrinsic(3),
            EventPhase::Finalization,
            EventPhase::Initialization,
        ] {
            let (tag, idx) = phase_to_columns(phase);
            assert_eq!(phase_from_columns(tag, idx).unwrap(), phase);
        }
        assert!(phase_from_columns("apply_extrinsic", None).is_err());
    }
}
