//! Conversion between SCALE values and their JSON rendering.
//!
//! Account ids and other byte arrays render as `0x` hex, integers that fit a
//! u64 as JSON numbers (larger ones as decimal strings), `Option` as the
//! inner value or `null`, enum variants as `{ "Variant": inner }`.

use subxt::dynamic::Value;
use subxt::ext::scale_value::{Composite, Primitive, ValueDef};

use chronicle_core::error::{ChainError, ChainResult};

/// Top-level fields of a call or event, with their names when present.
pub fn composite_fields<T>(composite: &Composite<T>) -> Vec<(Option<String>, serde_json::Value)> {
    match composite {
        Composite::Named(fields) => fields
            .iter()
            .map(|(name, v)| (Some(name.clone()), value_to_json(v)))
            .collect(),
        Composite::Unnamed(values) => values.iter().map(|v| (None, value_to_json(v))).collect(),
    }
}

/// Convert a Value to a JSON value.
pub fn value_to_json<T>(value: &subxt::ext::scale_value::Value<T>) -> serde_json::Value {
    value_def_to_json(&value.value)
}

/// Convert a storage key from its JSON rendering.
///
/// `0x` strings become byte sequences, numbers unsigned integers.
pub fn key_to_value(key: &serde_json::Value) -> ChainResult<Value> {
    match key {
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => hex::decode(hex_str)
                .map(Value::from_bytes)
                .map_err(|e| ChainError::RpcError(format!("invalid hex storage key {s}: {e}"))),
            None => Ok(Value::string(s.clone())),
        },
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|v| Value::u128(u128::from(v)))
            .ok_or_else(|| ChainError::RpcError(format!("unsupported numeric storage key {n}"))),
        serde_json::Value::Bool(b) => Ok(Value::bool(*b)),
        other => Err(ChainError::RpcError(format!(
            "unsupported storage key {other}"
        ))),
    }
}

fn composite_to_json<T>(composite: &Composite<T>) -> serde_json::Value {
    match composite {
        Composite::Unnamed(values) => {
            // Fixed-size byte arrays: AccountId, hashes, keys.
            if let Some(bytes) = as_bytes(values)
                && matches!(bytes.len(), 20 | 32 | 64)
            {
                return serde_json::Value::String(format!("0x{}", hex::encode(bytes)));
            }
            // Newtype wrappers.
            if values.len() == 1 {
                return value_to_json(&values[0]);
            }
            serde_json::Value::Array(values.iter().map(value_to_json).collect())
        }
        Composite::Named(fields) => {
            let obj: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(obj)
        }
    }
}

/// The composite as bytes, when every element is a u8-range integer.
fn as_bytes<T>(values: &[subxt::ext::scale_value::Value<T>]) -> Option<Vec<u8>> {
    values
        .iter()
        .map(|value| match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect()
}

/// `Raw0`..`Raw32` variants of identity `Data`.
fn is_raw_data_variant(name: &str) -> bool {
    name.strip_prefix("Raw")
        .is_some_and(|len| !len.is_empty() && len.chars().all(|c| c.is_ascii_digit()))
}

fn value_def_to_json<T>(value: &ValueDef<T>) -> serde_json::Value {
    match value {
        ValueDef::Composite(composite) => composite_to_json(composite),
        ValueDef::Variant(variant) => {
            let name = variant.name.as_str();

            match name {
                "None" => return serde_json::Value::Null,
                "Some" | "Id" => return composite_to_json(&variant.values),
                _ => {}
            }

            if is_raw_data_variant(name) {
                let bytes = match &variant.values {
                    Composite::Unnamed(values) if values.len() == 1 => match &values[0].value {
                        ValueDef::Composite(Composite::Unnamed(inner)) => as_bytes(inner),
                        _ => None,
                    },
                    Composite::Unnamed(values) => as_bytes(values),
                    Composite::Named(_) => None,
                };
                if let Some(bytes) = bytes {
                    return serde_json::json!({ "Raw": format!("0x{}", hex::encode(bytes)) });
                }
            }

            let inner = match &variant.values {
                Composite::Unnamed(values) if values.is_empty() => serde_json::Value::Null,
                Composite::Named(fields) if fields.is_empty() => serde_json::Value::Null,
                values => composite_to_json(values),
            };
            let mut map = serde_json::Map::new();
            map.insert(name.to_string(), inner);
            serde_json::Value::Object(map)
        }
        ValueDef::Primitive(primitive) => primitive_to_json(primitive),
        ValueDef::BitSequence(bits) => serde_json::Value::String(format!("{:?}", bits)),
    }
}

fn primitive_to_json(primitive: &Primitive) -> serde_json::Value {
    match primitive {
        Primitive::Bool(b) => serde_json::Value::Bool(*b),
        Primitive::Char(c) => serde_json::Value::String(c.to_string()),
        Primitive::String(s) => serde_json::Value::String(s.clone()),
        Primitive::U128(n) => match u64::try_from(*n) {
            Ok(small) => serde_json::Value::from(small),
            Err(_) => serde_json::Value::String(n.to_string()),
        },
        Primitive::I128(n) => match i64::try_from(*n) {
            Ok(small) => serde_json::Value::from(small),
            Err(_) => serde_json::Value::String(n.to_string()),
        },
        Primitive::U256(n) => serde_json::Value::String(format!("0x{}", hex::encode(n))),
        Primitive::I256(n) => serde_json::Value::String(format!("0x{}", hex::encode(n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_bytes_render_as_hex() {
        let account = Value::from_bytes([7u8; 32]);
        assert_eq!(value_to_json(&account), json!(format!("0x{}", "07".repeat(32))));
    }

    #[test]
    fn test_small_integers_are_numbers() {
        assert_eq!(value_to_json(&Value::u128(500)), json!(500));
        assert_eq!(
            value_to_json(&Value::u128(u128::MAX)),
            json!(u128::MAX.to_string())
        );
    }

    #[test]
    fn test_option_variants_unwrap() {
        let some = Value::unnamed_variant("Some", [Value::u128(3)]);
        let none = Value::unnamed_variant("None", Vec::<Value>::new());
        assert_eq!(value_to_json(&some), json!(3));
        assert_eq!(value_to_json(&none), json!(null));
    }

    // Test critique: Data::RawN doit devenir {"Raw": "0x.."} pour les identités
    #[test]
    fn test_identity_raw_data_normalized() {
        let raw = Value::unnamed_variant("Raw5", [Value::from_bytes(b"alice")]);
        assert_eq!(
            value_to_json(&raw),
            json!({ "Raw": format!("0x{}", hex::encode(b"alice")) })
        );
    }

    #[test]
    fn test_plain_variant_is_wrapped() {
        let judgement = Value::unnamed_variant("KnownGood", Vec::<Value>::new());
        assert_eq!(value_to_json(&judgement), json!({ "KnownGood": null }));
    }

    #[test]
    fn test_named_fields_keep_names() {
        let value = Value::named_composite([("free", Value::u128(10)), ("reserved", Value::u128(2))]);
        let ValueDef::Composite(composite) = &value.value else {
            panic!("expected composite");
        };
        let fields = composite_fields(composite);
        assert_eq!(fields[0], (Some("free".to_string()), json!(10)));
        assert_eq!(fields[1], (Some("reserved".to_string()), json!(2)));
    }

    #[test]
    fn test_storage_keys_from_json() {
        let hex_key = format!("0x{}", "01".repeat(32));
        assert_eq!(key_to_value(&json!(hex_key)).unwrap(), Value::from_bytes([1u8; 32]));
        assert_eq!(key_to_value(&json!(12)).unwrap(), Value::u128(12));
        assert!(key_to_value(&json!({ "a": 1 })).is_err());
    }
}
