// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::hash::Hash as StdHash;
use std::str::FromStr;

use thiserror::Error;

/// Length of BLAKE3 digest.
pub const DIGEST_LEN: usize = blake3::KEY_LEN;

/// BLAKE3 digest.
///
/// Digests identify byte content across the security subsystem: the authority key identifier of
/// a certificate issuer is the digest of its public key, and signed manifests travel as the
/// digest of their canonical encoding.
#[derive(Copy, Clone, Eq, PartialEq, StdHash)]
pub struct Digest(blake3::Hash);

impl Digest {
    /// Digests any byte sequence.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Self(blake3::hash(buf.as_ref()))
    }

    /// Wraps an already computed digest.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    /// Returns digest as bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        self.0.as_bytes()
    }

    /// Returns digest as hexadecimal string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Digest> for [u8; DIGEST_LEN] {
    fn from(digest: Digest) -> Self {
        *digest.as_bytes()
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = DigestError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; DIGEST_LEN] = value
            .try_into()
            .map_err(|_| DigestError::InvalidLength(value.len(), DIGEST_LEN))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)?;
        bytes.as_slice().try_into()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Digest").field(&self.to_hex()).finish()
    }
}

impl PartialOrd for Digest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Digest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

/// Error types for `Digest` struct.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DigestError {
    #[error("invalid digest length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    #[error("invalid hex encoding in digest string")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{DIGEST_LEN, Digest, DigestError};

    #[test]
    fn digesting_bytes() {
        let digest = Digest::new(b"peerbus");
        assert_eq!(digest.as_bytes(), blake3::hash(b"peerbus").as_bytes());
        assert_eq!(digest, Digest::new(b"peerbus"));
        assert_ne!(digest, Digest::new(b"peerbus2"));
    }

    #[test]
    fn hex_round_trip() {
        let digest = Digest::new([7u8; 11]);
        let hex = digest.to_hex();
        assert_eq!(hex.len(), DIGEST_LEN * 2);
        assert_eq!(Digest::from_str(&hex), Ok(digest));
        assert_eq!(format!("{digest}"), hex);
    }

    #[test]
    fn invalid_digests() {
        assert_eq!(
            Digest::try_from([0u8; 12].as_slice()),
            Err(DigestError::InvalidLength(12, DIGEST_LEN))
        );
        assert!(matches!(
            Digest::from_str("not a hex string"),
            Err(DigestError::InvalidHexEncoding(_))
        ));
        // Correctly encoded but too short.
        assert_eq!(
            Digest::from_str("abcdef"),
            Err(DigestError::InvalidLength(3, DIGEST_LEN))
        );
    }

    #[test]
    fn serde_encoding_formats() {
        let digest = Digest::new(b"serde");

        // Human-readable formats use hex strings.
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
        assert_eq!(serde_json::from_str::<Digest>(&json).unwrap(), digest);

        // Binary formats use raw bytes.
        let mut cbor = Vec::new();
        ciborium::into_writer(&digest, &mut cbor).unwrap();
        assert_eq!(cbor.len(), DIGEST_LEN + 2);
        assert_eq!(ciborium::from_reader::<Digest, _>(&cbor[..]).unwrap(), digest);
    }
}
