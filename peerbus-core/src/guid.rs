// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::hash::Hash as StdHash;
use std::str::FromStr;

use thiserror::Error;

/// Length of group and application identifiers.
pub const GUID_LEN: usize = 16;

/// 128 bit identifier for security groups and applications.
///
/// Guids carry no structure, they are compared byte for byte. A membership certificate binds a
/// peer to the guid of a security group, admin groups are regular groups whose guid is
/// distinguished only by where it appears in a policy.
#[derive(Copy, Clone, Eq, PartialEq, StdHash, PartialOrd, Ord)]
pub struct Guid([u8; GUID_LEN]);

impl Guid {
    /// Generates a fresh random identifier.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Returns identifier from byte representation.
    pub fn from_bytes(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns identifier as bytes.
    pub fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }

    /// Returns identifier as hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; GUID_LEN]> for Guid {
    fn from(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Guid> for [u8; GUID_LEN] {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl TryFrom<&[u8]> for Guid {
    type Error = GuidError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; GUID_LEN] = value
            .try_into()
            .map_err(|_| GuidError::InvalidLength(value.len(), GUID_LEN))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)?;
        bytes.as_slice().try_into()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Guid").field(&self.to_hex()).finish()
    }
}

/// Error types for `Guid` struct.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GuidError {
    #[error("invalid identifier length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    #[error("invalid hex encoding in identifier string")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{GUID_LEN, Guid, GuidError};

    #[test]
    fn random_identifiers_differ() {
        assert_ne!(Guid::random(), Guid::random());
    }

    #[test]
    fn hex_round_trip() {
        let guid = Guid::from_bytes([144u8; GUID_LEN]);
        assert_eq!(guid.to_hex().len(), GUID_LEN * 2);
        assert_eq!(Guid::from_str(&guid.to_hex()), Ok(guid));
    }

    #[test]
    fn invalid_identifiers() {
        assert_eq!(
            Guid::try_from([0u8; 4].as_slice()),
            Err(GuidError::InvalidLength(4, GUID_LEN))
        );
        assert!(matches!(
            Guid::from_str("zz"),
            Err(GuidError::InvalidHexEncoding(_))
        ));
    }
}
