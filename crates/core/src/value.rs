//! Parsing of JSON-rendered SCALE values.
//!
//! Block suppliers and chain state render runtime values as JSON. These
//! helpers accept the shapes Substrate nodes and decoders commonly produce.

use crate::models::AccountId;

// =============================================================================
// Field extraction
// =============================================================================

/// Extract a field, trying multiple key names and falling back to index.
///
/// # Example
///
/// ```ignore
/// let who = extract_field(data, &["who", "stash"], 0, parse_account);
/// ```
pub fn extract_field<T>(
    data: &serde_json::Value,
    keys: &[&str],
    index: usize,
    parser: fn(&serde_json::Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .find_map(|key| data.get(*key))
        .or_else(|| data.get(index))
        .and_then(parser)
}

// =============================================================================
// Account parsing
// =============================================================================

/// Parse an account ID from various JSON representations.
///
/// Handles:
/// - Hex string: `"0x1234..."`
/// - Wrapped object: `{ "Id": "0x..." }`
/// - Array wrapper: `["0x..."]`
/// - Byte array: `[b0, b1, ..., b31]`
pub fn parse_account(value: &serde_json::Value) -> Option<AccountId> {
    match value {
        serde_json::Value::String(s) => {
            let hex_str = s.strip_prefix("0x").unwrap_or(s);
            let bytes = hex::decode(hex_str).ok()?;
            let arr: [u8; 32] = bytes.try_into().ok()?;
            Some(AccountId(arr))
        }
        serde_json::Value::Object(obj) => obj
            .get("Id")
            .or_else(|| obj.get("id"))
            .and_then(parse_account),
        serde_json::Value::Array(arr) => {
            if arr.len() == 1 {
                return parse_account(&arr[0]);
            }
            parse_hash256(value).map(AccountId)
        }
        _ => None,
    }
}

/// Parse a list of accounts; `None` if any element is not an account.
pub fn parse_accounts(value: &serde_json::Value) -> Option<Vec<AccountId>> {
    value.as_array()?.iter().map(parse_account).collect()
}

// =============================================================================
// Numeric parsing
// =============================================================================

/// Parse an amount (u128) from JSON.
///
/// JSON numbers stop at u64, so large balances arrive as decimal or
/// `0x`-prefixed big-endian hex strings.
pub fn parse_amount(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(u128::from),
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => u128::from_str_radix(hex_str, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub fn parse_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse a u32 from JSON.
pub fn parse_u32(value: &serde_json::Value) -> Option<u32> {
    parse_u64(value).and_then(|v| v.try_into().ok())
}

// =============================================================================
// Hash/bytes parsing
// =============================================================================

/// Parse a 32-byte hash from JSON.
pub fn parse_hash256(value: &serde_json::Value) -> Option<[u8; 32]> {
    parse_bytes(value)?.try_into().ok()
}

/// Parse arbitrary bytes from JSON.
///
/// Handles:
/// - Hex string: `"0x1234..."`
/// - Byte array: `[b0, b1, ...]`
pub fn parse_bytes(value: &serde_json::Value) -> Option<Vec<u8>> {
    match value {
        serde_json::Value::String(s) => {
            let hex_str = s.strip_prefix("0x").unwrap_or(s);
            hex::decode(hex_str).ok()
        }
        serde_json::Value::Array(arr) => arr
            .iter()
            .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

/// Parse text stored as `{ "Raw": "..." }`, a bare string, or hex bytes.
///
/// `{ "None": null }` and empty strings yield `None`.
pub fn parse_data_text(value: &serde_json::Value) -> Option<String> {
    let inner = match value {
        serde_json::Value::Object(obj) => obj.get("Raw")?,
        other => other,
    };
    let text = inner.as_str()?;
    let decoded = match text.strip_prefix("0x") {
        Some(hex_str) => hex::decode(hex_str)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| text.to_string()),
        None => text.to_string(),
    };
    (!decoded.is_empty()).then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_account_shapes() {
        let hex = "0x".to_string() + &"ab".repeat(32);
        assert_eq!(parse_account(&json!(hex)), Some(AccountId([0xab; 32])));
        assert_eq!(parse_account(&json!({"Id": hex})), Some(AccountId([0xab; 32])));
        assert_eq!(parse_account(&json!([hex])), Some(AccountId([0xab; 32])));

        let bytes: Vec<u8> = (0..32).collect();
        let expected: [u8; 32] = (0..32).collect::<Vec<u8>>().try_into().unwrap();
        assert_eq!(parse_account(&json!(bytes)), Some(AccountId(expected)));
    }

    #[test]
    fn test_parse_account_rejects_invalid() {
        let short_hex = "0x".to_string() + &"ab".repeat(16);
        assert!(parse_account(&json!(short_hex)).is_none());
        assert!(parse_account(&json!("not_valid_hex")).is_none());
        assert!(parse_account(&json!(12)).is_none());
    }

    #[test]
    fn test_parse_accounts_all_or_nothing() {
        let a = "0x".to_string() + &"01".repeat(32);
        let b = "0x".to_string() + &"02".repeat(32);
        assert_eq!(parse_accounts(&json!([a, b])).map(|v| v.len()), Some(2));
        assert_eq!(parse_accounts(&json!([a, "junk"])), None);
    }

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount(&json!(12345)), Some(12345));
        assert_eq!(parse_amount(&json!("67890")), Some(67890));
        assert_eq!(parse_amount(&json!("0x01f4")), Some(500));
        let large = "340282366920938463463374607431768211455";
        assert_eq!(parse_amount(&json!(large)), Some(u128::MAX));
        assert_eq!(parse_amount(&json!(null)), None);
    }

    #[test]
    fn test_parse_u32_bounds() {
        assert_eq!(parse_u32(&json!(12345)), Some(12345));
        assert!(parse_u32(&json!(u64::MAX)).is_none());
    }

    #[test]
    fn test_parse_bytes_rejects_large_elements() {
        assert_eq!(parse_bytes(&json!("0xdeadbeef")), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(parse_bytes(&json!([1, 2, 3])), Some(vec![1, 2, 3]));
        assert_eq!(parse_bytes(&json!([1, 300])), None);
    }

    #[test]
    fn test_parse_data_text() {
        assert_eq!(parse_data_text(&json!({"Raw": "Alice"})), Some("Alice".into()));
        assert_eq!(parse_data_text(&json!({"Raw": "0x426f62"})), Some("Bob".into()));
        assert_eq!(parse_data_text(&json!({"None": null})), None);
        assert_eq!(parse_data_text(&json!("")), None);
    }

    #[test]
    fn test_extract_field_key_then_index() {
        let by_key = json!({"who": "0x".to_string() + &"cd".repeat(32)});
        assert!(extract_field(&by_key, &["stash", "who"], 0, parse_account).is_some());

        let by_index = json!(["0x".to_string() + &"ef".repeat(32), 1000]);
        assert_eq!(extract_field(&by_index, &["value"], 1, parse_amount), Some(1000));
    }
}
