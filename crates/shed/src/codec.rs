//! Pluggable content codecs.
//!
//! A wheel always stores raw bytes. A [`Codec`] turns those bytes into a typed value and
//! back, and declares the [`ContentType`] tag it belongs to so a wheel can refuse a codec
//! that does not match what it was created as.

use crate::error::ShedError;
use crate::record::ContentType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

pub trait Codec {
    type Value;

    const CONTENT_TYPE: ContentType;

    /// # Errors
    /// Returns [`ShedError::Codec`] if the value cannot be represented as bytes.
    fn encode(value: &Self::Value) -> Result<Vec<u8>, ShedError>;

    /// Decodes non-empty content. Empty content never reaches a codec; callers supply
    /// a default for it instead.
    ///
    /// # Errors
    /// Returns [`ShedError::Codec`] if the bytes are not valid for this codec.
    fn decode(bytes: &[u8]) -> Result<Self::Value, ShedError>;
}

/// UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl Codec for PlainText {
    type Value = String;

    const CONTENT_TYPE: ContentType = ContentType::PlainText;

    fn encode(value: &String) -> Result<Vec<u8>, ShedError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<String, ShedError> {
        String::from_utf8(bytes.to_vec()).map_err(ShedError::codec)
    }
}

/// JSON through `serde_json`; `T` defaults to a free-form [`serde_json::Value`].
pub struct Json<T = serde_json::Value>(PhantomData<fn() -> T>);

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Json<{}>", std::any::type_name::<T>())
    }
}

impl<T> Codec for Json<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    const CONTENT_TYPE: ContentType = ContentType::Json;

    fn encode(value: &T) -> Result<Vec<u8>, ShedError> {
        serde_json::to_vec(value).map_err(ShedError::codec)
    }

    fn decode(bytes: &[u8]) -> Result<T, ShedError> {
        serde_json::from_slice(bytes).map_err(ShedError::codec)
    }
}

/// Shared decode path: empty content yields `default`, anything else goes to the codec.
pub(crate) fn decode_or<C: Codec>(bytes: &[u8], default: C::Value) -> Result<C::Value, ShedError> {
    if bytes.is_empty() { Ok(default) } else { C::decode(bytes) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u32,
    }

    #[test]
    fn empty_content_yields_default() {
        let value = decode_or::<Json>(b"", json!({"fresh": true})).unwrap();
        assert_eq!(value, json!({"fresh": true}));

        let text = decode_or::<PlainText>(b"", "fallback".to_owned()).unwrap();
        assert_eq!(text, "fallback");
    }

    #[test]
    fn malformed_json_is_a_codec_error() {
        let err = decode_or::<Json>(b"{not json", json!(null)).unwrap_err();
        assert!(matches!(err, ShedError::Codec { .. }), "unexpected error: {err:?}");
    }

    #[test]
    fn typed_json_values() {
        let bytes = Json::<Counter>::encode(&Counter { n: 7 }).unwrap();
        assert_eq!(bytes, br#"{"n":7}"#);
        assert_eq!(Json::<Counter>::decode(&bytes).unwrap(), Counter { n: 7 });
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert!(PlainText::decode(&[0xff, 0xfe]).is_err());
    }
}
