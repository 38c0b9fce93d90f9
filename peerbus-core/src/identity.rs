// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::hash::Hash as StdHash;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// Length of Ed25519 private key.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Length of Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 signing key.
///
/// Private keys never leave the key store of the peer owning them. Their public halves are what
/// policies, certificates and peer entries refer to.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the systems random number generator as entropy.
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    /// Returns private key from byte representation.
    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LEN]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    /// Returns private key as bytes.
    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        self.0.as_bytes()
    }

    /// Returns byte representation of private key.
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Returns private key as hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Derives the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Signs a byte sequence.
    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PRIVATE_KEY_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value.len(), PRIVATE_KEY_LEN))?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl FromStr for PrivateKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)?;
        bytes.as_slice().try_into()
    }
}

/// Ed25519 public key, the identity of a peer.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Returns public key from byte representation.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LEN]) -> Result<Self, IdentityError> {
        let key = VerifyingKey::from_bytes(bytes)?;
        Ok(Self(key))
    }

    /// Returns public key as bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.0.as_bytes()
    }

    /// Returns byte representation of public key.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Returns public key as hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verifies a signature over a byte sequence against this public key.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify_strict(bytes, &signature.0).is_ok()
    }
}

impl StdHash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value.len(), PUBLIC_KEY_LEN))?;
        Self::from_bytes(&bytes)
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)?;
        bytes.as_slice().try_into()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

/// Ed25519 signature.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    /// Returns signature from byte representation.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    /// Returns byte representation of signature.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Returns signature as hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(signature: ed25519_dalek::Signature) -> Self {
        Self(signature)
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = IdentityError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SIGNATURE_LEN] = value
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(value.len(), SIGNATURE_LEN))?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}

/// Error types for key and signature structs.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid key or signature length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    #[error("invalid hex encoding in key or signature string")]
    InvalidHexEncoding(#[from] hex::FromHexError),

    #[error(transparent)]
    Signature(#[from] ed25519_dalek::SignatureError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{IdentityError, PRIVATE_KEY_LEN, PrivateKey, PublicKey, SIGNATURE_LEN, Signature};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let public_key = private_key.public_key();

        let signature = private_key.sign(b"hello peer");
        assert!(public_key.verify(b"hello peer", &signature));

        // Tampered payloads and foreign keys do not verify.
        assert!(!public_key.verify(b"hello pear", &signature));
        assert!(!PrivateKey::new().public_key().verify(b"hello peer", &signature));
    }

    #[test]
    fn key_byte_representations() {
        let private_key = PrivateKey::from_bytes(&[3u8; PRIVATE_KEY_LEN]);
        assert_eq!(private_key.to_bytes(), [3u8; PRIVATE_KEY_LEN]);

        let public_key = private_key.public_key();
        let restored = PublicKey::from_bytes(&public_key.to_bytes()).unwrap();
        assert_eq!(public_key, restored);

        let signature = private_key.sign(b"bytes");
        let restored = Signature::from_bytes(&signature.to_bytes());
        assert!(public_key.verify(b"bytes", &restored));
    }

    #[test]
    fn hex_round_trip() {
        let private_key = PrivateKey::new();
        let restored = PrivateKey::from_str(&private_key.to_hex()).unwrap();
        assert_eq!(private_key.to_bytes(), restored.to_bytes());

        let public_key = private_key.public_key();
        assert_eq!(PublicKey::from_str(&public_key.to_hex()).unwrap(), public_key);
        assert_eq!(format!("{public_key}"), public_key.to_hex());
    }

    #[test]
    fn invalid_key_material() {
        assert!(matches!(
            PublicKey::try_from([0u8; 16].as_slice()),
            Err(IdentityError::InvalidLength(16, 32))
        ));
        assert!(matches!(
            Signature::try_from([0u8; 63].as_slice()),
            Err(IdentityError::InvalidLength(63, SIGNATURE_LEN))
        ));
        assert!(matches!(
            PublicKey::from_str("garbage"),
            Err(IdentityError::InvalidHexEncoding(_))
        ));
    }

    #[test]
    fn serde_encoding_formats() {
        let public_key = PrivateKey::new().public_key();

        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", public_key.to_hex()));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), public_key);

        let mut cbor = Vec::new();
        ciborium::into_writer(&public_key, &mut cbor).unwrap();
        assert_eq!(
            ciborium::from_reader::<PublicKey, _>(&cbor[..]).unwrap(),
            public_key
        );
    }
}
