// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage interface the security subsystem persists its state through.
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::guid::Guid;

/// Identifier of a key store entry: an entry kind scoped by an application or group identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StoreId {
    guid: Guid,
    kind: String,
}

impl StoreId {
    pub fn new(guid: Guid, kind: impl Into<String>) -> Self {
        Self {
            guid,
            kind: kind.into(),
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.guid)
    }
}

/// Opaque CBOR payload persisted under a [`StoreId`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyBlob(Vec<u8>);

impl KeyBlob {
    /// Encodes a serializable value into a blob.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, EncodeError> {
        Ok(Self(encode_cbor(value)?))
    }

    /// Decodes the blob back into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        decode_cbor(self.0.as_slice())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Interface onto persistent storage for security state.
///
/// Handles are expected to be cheaply cloneable onto shared underlying storage. All operations
/// complete synchronously against local state.
pub trait KeyStore {
    type Error: std::error::Error;

    /// Returns the blob stored under the given id.
    fn get(&self, id: &StoreId) -> Result<Option<KeyBlob>, Self::Error>;

    /// Stores a blob under the given id, replacing any previous entry.
    fn store(&self, id: StoreId, blob: KeyBlob) -> Result<(), Self::Error>;

    /// Deletes the entry under the given id. Deleting an absent entry is not an error.
    fn delete(&self, id: &StoreId) -> Result<(), Self::Error>;
}

/// In-memory key store for tests and embedders without persistent storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<HashMap<StoreId, KeyBlob>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_store(&self) -> RwLockReadGuard<'_, HashMap<StoreId, KeyBlob>> {
        self.inner
            .read()
            .expect("acquire shared read access on key store")
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, HashMap<StoreId, KeyBlob>> {
        self.inner
            .write()
            .expect("acquire exclusive write access on key store")
    }
}

impl KeyStore for MemoryKeyStore {
    type Error = Infallible;

    fn get(&self, id: &StoreId) -> Result<Option<KeyBlob>, Self::Error> {
        Ok(self.read_store().get(id).cloned())
    }

    fn store(&self, id: StoreId, blob: KeyBlob) -> Result<(), Self::Error> {
        self.write_store().insert(id, blob);
        Ok(())
    }

    fn delete(&self, id: &StoreId) -> Result<(), Self::Error> {
        self.write_store().remove(id);
        Ok(())
    }
}
