// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helper methods to handle CBOR encoding and decoding.
//!
//! CBOR is the canonical wire and storage format for policies, manifests and certificates. All
//! signatures in this crate are computed over these encodings.
use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Encodes any serializable value into CBOR bytes.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes: Vec<u8> = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

/// Decodes CBOR bytes into any deserializable type.
pub fn decode_cbor<T: DeserializeOwned>(bytes: impl std::io::Read) -> Result<T, DecodeError> {
    let value = ciborium::de::from_reader(bytes)?;
    Ok(value)
}

/// Error types for CBOR encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cbor encoder failed due to io issue: {0}")]
    Io(std::io::Error),

    #[error("invalid cbor value: {0}")]
    Value(String),
}

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => EncodeError::Io(err),
            SerializeError::Value(err) => EncodeError::Value(err),
        }
    }
}

/// Error types for CBOR decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cbor decoder failed due to io issue: {0}")]
    Io(std::io::Error),

    #[error("invalid cbor syntax at input position {0}")]
    Syntax(usize),

    #[error("invalid cbor semantics: {1}")]
    Semantic(Option<usize>, String),

    #[error("cbor input exceeded recursion limit")]
    RecursionLimitExceeded,
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) => DecodeError::Io(err),
            DeserializeError::Syntax(pos) => DecodeError::Syntax(pos),
            DeserializeError::Semantic(pos, desc) => DecodeError::Semantic(pos, desc),
            DeserializeError::RecursionLimitExceeded => DecodeError::RecursionLimitExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{DecodeError, decode_cbor, encode_cbor};

    #[test]
    fn encode_decode_round_trip() {
        #[derive(Debug, Deserialize, PartialEq, Serialize)]
        struct Entry {
            version: u32,
            names: Vec<String>,
        }

        let entry = Entry {
            version: 7,
            names: vec!["alpha".into(), "beta".into()],
        };
        let bytes = encode_cbor(&entry).unwrap();
        assert_eq!(decode_cbor::<Entry>(&bytes[..]).unwrap(), entry);
    }

    #[test]
    fn decoding_invalid_bytes_fails() {
        // 0xff is a lone "break" marker which is not valid at the top level.
        let result = decode_cbor::<Vec<u8>>([0xff].as_slice());
        assert!(matches!(result, Err(DecodeError::Syntax(_) | DecodeError::Semantic(..))));
    }
}
