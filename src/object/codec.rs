//! Tagged JSON encoding.
//!
//! A stored object is a flat JSON object carrying its type discriminator in
//! `__type__`, next to the fields serde produces for the type:
//!
//! ```text
//! {"__type__":"Item","title":"Milk","checked":false}
//! ```

use super::Document;
use crate::error::{Result, StoreError};
use bytes::Bytes;
use serde_json::Value as Json;

pub const TYPE_FIELD: &str = "__type__";

pub fn encode<T: Document>(obj: &T) -> Result<Bytes> {
    let Json::Object(mut fields) = serde_json::to_value(obj)? else {
        return Err(StoreError::InvalidArgument(format!(
            "{} must serialize to a field map",
            T::TAG
        )));
    };
    if fields.contains_key(TYPE_FIELD) {
        return Err(StoreError::InvalidArgument(format!(
            "{} uses the reserved field {}",
            T::TAG,
            TYPE_FIELD
        )));
    }
    fields.insert(TYPE_FIELD.to_string(), Json::String(T::TAG.to_string()));
    Ok(Bytes::from(serde_json::to_vec(&Json::Object(fields))?))
}

/// Split a stored payload into its tag and remaining fields.
pub fn decode_envelope(key: &str, raw: &[u8]) -> Result<(String, Json)> {
    let parsed: Json = serde_json::from_slice(raw)
        .map_err(|e| StoreError::protocol(format!("{}: not a tagged value: {}", key, e)))?;
    let Json::Object(mut fields) = parsed else {
        return Err(StoreError::protocol(format!("{}: not a tagged value", key)));
    };
    let tag = match fields.remove(TYPE_FIELD) {
        Some(Json::String(tag)) => tag,
        Some(_) => {
            return Err(StoreError::protocol(format!("{}: {} is not a string", key, TYPE_FIELD)))
        }
        None => return Err(StoreError::protocol(format!("{}: missing {}", key, TYPE_FIELD))),
    };
    Ok((tag, Json::Object(fields)))
}

/// Decode the untagged fields as `T`.
pub fn decode_fields<T: Document>(key: &str, fields: Json) -> Result<T> {
    serde_json::from_value(fields)
        .map_err(|e| StoreError::protocol(format!("{}: bad {} payload: {}", key, T::TAG, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::Map;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Document for Note {
        const TAG: &'static str = "Note";
    }

    #[test]
    fn test_encode_adds_tag() {
        let raw = encode(&Note {
            text: "hi".to_string(),
        })
        .unwrap();
        let json: Json = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json[TYPE_FIELD], "Note");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_decode_envelope_rejects_untagged() {
        assert!(decode_envelope("k", b"{\"text\":\"x\"}").is_err());
        assert!(decode_envelope("k", b"[1,2]").is_err());
        assert!(decode_envelope("k", b"not json").is_err());
        assert!(decode_envelope("k", b"{\"__type__\":7}").is_err());

        let (tag, fields) = decode_envelope("k", b"{\"__type__\":\"Note\",\"text\":\"x\"}").unwrap();
        assert_eq!(tag, "Note");
        let note: Note = decode_fields("k", fields).unwrap();
        assert_eq!(note.text, "x");
    }

    #[test]
    fn test_decode_fields_reports_protocol_error() {
        let err = decode_fields::<Note>("k", Json::Object(Map::new())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }
}
