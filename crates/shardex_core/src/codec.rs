//! Body codecs.
//!
//! A body codec turns an entity into the bytes stored under the body field
//! tag and back. [`JsonCodec`] is the default; [`CborCodec`] trades
//! readability for size.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Encodes and decodes entity bodies.
pub trait BodyCodec: Clone + Send + Sync + 'static {
    /// Encodes an entity.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the entity cannot be serialized.
    fn encode<T: Serialize>(&self, entity: &T) -> CoreResult<Vec<u8>>;

    /// Decodes an entity.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes do not describe a `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CoreResult<T>;
}

/// UTF-8 JSON bodies with null fields left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn encode<T: Serialize>(&self, entity: &T) -> CoreResult<Vec<u8>> {
        let mut value = serde_json::to_value(entity)?;
        strip_nulls(&mut value);
        Ok(serde_json::to_vec(&value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, field| !field.is_null());
            fields.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// CBOR bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl BodyCodec for CborCodec {
    fn encode<T: Serialize>(&self, entity: &T) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(entity, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CoreResult<T> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        #[serde(default)]
        tag: Option<String>,
        children: Vec<Child>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Child {
        #[serde(default)]
        label: Option<String>,
    }

    fn note() -> Note {
        Note {
            title: "hello".into(),
            tag: None,
            children: vec![Child { label: None }],
        }
    }

    #[test]
    fn json_omits_null_fields() {
        let bytes = JsonCodec.encode(&note()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"children":[{}],"title":"hello"}"#);
    }

    #[test]
    fn json_decodes_missing_fields_as_none() {
        let bytes = JsonCodec.encode(&note()).unwrap();
        let back: Note = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, note());
    }

    #[test]
    fn json_decode_garbage_is_codec_error() {
        let result: CoreResult<Note> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(CoreError::Codec { .. })));
    }

    #[test]
    fn cbor_decodes_what_it_encodes() {
        let bytes = CborCodec.encode(&note()).unwrap();
        let back: Note = CborCodec.decode(&bytes).unwrap();
        assert_eq!(back, note());
    }

    #[test]
    fn cbor_decode_garbage_is_codec_error() {
        let result: CoreResult<Note> = CborCodec.decode(&[0xff, 0x00]);
        assert!(matches!(result, Err(CoreError::Codec { .. })));
    }
}
