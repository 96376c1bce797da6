#![forbid(unsafe_code)]

use super::super::LixError;
use lix_core::ids::NO_CONTENT_SNAPSHOT_ID;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compact serialization with object keys in sorted order.
pub(in crate::store) fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Content address of a snapshot. Deletions share [`NO_CONTENT_SNAPSHOT_ID`].
pub(in crate::store) fn snapshot_id_for(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return NO_CONTENT_SNAPSHOT_ID.to_string();
    };
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(content).as_bytes());
    hex_lower(&hasher.finalize())
}

pub(in crate::store) fn parse_json_column(raw: Option<String>) -> Result<Option<Value>, LixError> {
    raw.map(|text| serde_json::from_str::<Value>(&text))
        .transpose()
        .map_err(LixError::from)
}

pub(in crate::store) fn json_column(value: Option<&Value>) -> Option<String> {
    value.map(canonical_json)
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_ids_ignore_key_order() {
        let a = json!({"a": 1, "b": [1, 2]});
        let b: Value = serde_json::from_str(r#"{"b":[1,2],"a":1}"#).unwrap();
        assert_eq!(snapshot_id_for(Some(&a)), snapshot_id_for(Some(&b)));
        assert_eq!(snapshot_id_for(Some(&a)).len(), 64);
        assert_eq!(snapshot_id_for(None), NO_CONTENT_SNAPSHOT_ID);
    }
}
