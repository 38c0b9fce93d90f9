// SPDX-License-Identifier: MIT OR Apache-2.0

//! Primitive value types for the peerbus security subsystem: Ed25519 key material, BLAKE3
//! digests, group identifiers, certificates and the credential store they persist into.
//!
//! Everything in this crate is a plain owned value. Certificate verification is local signature
//! math over canonical CBOR encodings; no networking, no side effects.
pub mod cbor;
pub mod cert;
pub mod digest;
pub mod guid;
pub mod identity;
pub mod keystore;
mod serde;

pub use cert::{
    Certificate, CertificateError, IdentityCertificate, MembershipCertificate, ValidityPeriod,
    key_id, verify_chain,
};
pub use digest::{Digest, DigestError};
pub use guid::{Guid, GuidError};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use keystore::{KeyBlob, KeyStore, MemoryKeyStore, StoreId};
