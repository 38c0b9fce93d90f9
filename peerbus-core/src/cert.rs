// SPDX-License-Identifier: MIT OR Apache-2.0

//! Certificate value types for peer identities and security-group memberships.
//!
//! Certificates arrive in this subsystem already parsed; what remains here is the signed value
//! itself. Signing covers the canonical CBOR encoding of the certificate with its signature
//! field cleared, the same bytes `verify` checks against the issuer key.
//!
//! Chains are ordered leaf first. Every certificate must carry a valid signature from its
//! issuer and name the subject of the next certificate in the chain as that issuer, up to a
//! self-signed root.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::Digest;
use crate::guid::Guid;
use crate::identity::{PrivateKey, PublicKey, Signature};

/// Derives the key identifier of an authority, the fingerprint membership entries are keyed by.
pub fn key_id(key: &PublicKey) -> Digest {
    Digest::new(key.as_bytes())
}

/// Time window during which a certificate is valid, in Unix seconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub not_before: u64,
    pub not_after: u64,
}

impl ValidityPeriod {
    /// Checks if the given point in time falls into the window.
    pub fn covers(&self, unix_seconds: u64) -> bool {
        self.not_before <= unix_seconds && unix_seconds <= self.not_after
    }
}

impl Default for ValidityPeriod {
    fn default() -> Self {
        Self {
            not_before: 0,
            not_after: u64::MAX,
        }
    }
}

/// Common surface of certificate types used for chain verification.
pub trait Certificate {
    /// Public key this certificate certifies.
    fn subject(&self) -> &PublicKey;

    /// Public key of the authority which signed this certificate.
    fn issuer(&self) -> &PublicKey;

    /// Checks the certificate signature against the issuer key.
    fn verify(&self) -> bool;
}

/// Certificate binding a peer's public key to an identity alias and a manifest digest.
///
/// The digest is what ties the self-declared manifest to the identity: `update_identity`
/// recomputes the digest of the offered manifest and compares it against the leaf certificate
/// of the offered chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    pub serial: u64,
    pub subject: PublicKey,
    pub alias: String,
    pub issuer: PublicKey,
    pub manifest_digest: Digest,
    pub validity: ValidityPeriod,
    pub signature: Option<Signature>,
}

impl IdentityCertificate {
    /// Encodes the certificate including its signature field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&self, &mut bytes)
            .expect("CBOR encoder failed due to an critical IO error");
        bytes
    }

    /// Signs the certificate with the issuer's private key.
    pub fn sign(&mut self, private_key: &PrivateKey) {
        // Make sure the signature is not already set before encoding.
        self.signature = None;
        let bytes = self.to_bytes();
        self.signature = Some(private_key.sign(&bytes));
    }

    /// Verifies the certificate signature against the issuer key.
    pub fn verify(&self) -> bool {
        match &self.signature {
            Some(claimed_signature) => {
                let mut unsigned = self.clone();
                unsigned.signature = None;
                self.issuer.verify(&unsigned.to_bytes(), claimed_signature)
            }
            None => false,
        }
    }

    /// Key identifier of the issuing authority.
    pub fn issuer_key_id(&self) -> Digest {
        key_id(&self.issuer)
    }
}

impl Certificate for IdentityCertificate {
    fn subject(&self) -> &PublicKey {
        &self.subject
    }

    fn issuer(&self) -> &PublicKey {
        &self.issuer
    }

    fn verify(&self) -> bool {
        self.verify()
    }
}

/// Certificate binding a peer's public key to membership in a security group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MembershipCertificate {
    pub serial: u64,
    pub subject: PublicKey,
    pub group: Guid,
    pub issuer: PublicKey,
    pub validity: ValidityPeriod,
    pub signature: Option<Signature>,
}

impl MembershipCertificate {
    /// Encodes the certificate including its signature field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&self, &mut bytes)
            .expect("CBOR encoder failed due to an critical IO error");
        bytes
    }

    /// Signs the certificate with the issuer's private key.
    pub fn sign(&mut self, private_key: &PrivateKey) {
        self.signature = None;
        let bytes = self.to_bytes();
        self.signature = Some(private_key.sign(&bytes));
    }

    /// Verifies the certificate signature against the issuer key.
    pub fn verify(&self) -> bool {
        match &self.signature {
            Some(claimed_signature) => {
                let mut unsigned = self.clone();
                unsigned.signature = None;
                self.issuer.verify(&unsigned.to_bytes(), claimed_signature)
            }
            None => false,
        }
    }

    /// Key identifier of the issuing authority.
    pub fn issuer_key_id(&self) -> Digest {
        key_id(&self.issuer)
    }
}

impl Certificate for MembershipCertificate {
    fn subject(&self) -> &PublicKey {
        &self.subject
    }

    fn issuer(&self) -> &PublicKey {
        &self.issuer
    }

    fn verify(&self) -> bool {
        self.verify()
    }
}

/// Verifies a leaf-first certificate chain.
///
/// Every certificate needs a valid signature from its issuer and, except for the last one, its
/// issuer must be the subject of the next certificate in the chain.
pub fn verify_chain<C: Certificate>(chain: &[C]) -> Result<(), CertificateError> {
    if chain.is_empty() {
        return Err(CertificateError::EmptyChain);
    }

    for (index, certificate) in chain.iter().enumerate() {
        if !certificate.verify() {
            return Err(CertificateError::InvalidSignature(index));
        }

        if let Some(parent) = chain.get(index + 1) {
            if certificate.issuer() != parent.subject() {
                return Err(CertificateError::BrokenChain(index, index + 1));
            }
        }
    }

    Ok(())
}

/// Error types for certificate chains.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum CertificateError {
    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("invalid signature on certificate {0} of chain")]
    InvalidSignature(usize),

    #[error("certificate {0} of chain was not issued by the subject of certificate {1}")]
    BrokenChain(usize, usize),

    #[error("certificate {0} of chain does not certify the expected subject")]
    WrongSubject(usize),
}

#[cfg(test)]
mod tests {
    use crate::digest::Digest;
    use crate::guid::Guid;
    use crate::identity::PrivateKey;

    use super::{
        CertificateError, IdentityCertificate, MembershipCertificate, ValidityPeriod, key_id,
        verify_chain,
    };

    fn identity_certificate(
        serial: u64,
        subject: &PrivateKey,
        issuer: &PrivateKey,
    ) -> IdentityCertificate {
        let mut certificate = IdentityCertificate {
            serial,
            subject: subject.public_key(),
            alias: format!("peer-{serial}"),
            issuer: issuer.public_key(),
            manifest_digest: Digest::new(b"manifest"),
            validity: ValidityPeriod::default(),
            signature: None,
        };
        certificate.sign(issuer);
        certificate
    }

    #[test]
    fn sign_and_verify_identity_certificate() {
        let authority = PrivateKey::new();
        let peer = PrivateKey::new();

        let mut certificate = identity_certificate(1, &peer, &authority);
        assert!(certificate.verify());

        // Without a signature or with tampered content verification fails.
        let mut unsigned = certificate.clone();
        unsigned.signature = None;
        assert!(!unsigned.verify());

        certificate.alias = "someone else".into();
        assert!(!certificate.verify());
    }

    #[test]
    fn sign_and_verify_membership_certificate() {
        let authority = PrivateKey::new();
        let member = PrivateKey::new();

        let mut certificate = MembershipCertificate {
            serial: 42,
            subject: member.public_key(),
            group: Guid::random(),
            issuer: authority.public_key(),
            validity: ValidityPeriod::default(),
            signature: None,
        };
        certificate.sign(&authority);
        assert!(certificate.verify());
        assert_eq!(certificate.issuer_key_id(), key_id(&authority.public_key()));

        certificate.serial = 43;
        assert!(!certificate.verify());
    }

    #[test]
    fn chain_verification() {
        let root = PrivateKey::new();
        let intermediate = PrivateKey::new();
        let peer = PrivateKey::new();

        let leaf = identity_certificate(3, &peer, &intermediate);
        let middle = identity_certificate(2, &intermediate, &root);
        let anchor = identity_certificate(1, &root, &root);

        assert_eq!(verify_chain(&[leaf.clone(), middle.clone(), anchor.clone()]), Ok(()));
        assert_eq!(verify_chain(&[anchor.clone()]), Ok(()));

        // Wrong order breaks the issuer linkage.
        assert_eq!(
            verify_chain(&[middle.clone(), leaf.clone()]),
            Err(CertificateError::BrokenChain(0, 1))
        );

        let empty: [IdentityCertificate; 0] = [];
        assert_eq!(verify_chain(&empty), Err(CertificateError::EmptyChain));

        let mut forged = leaf;
        forged.manifest_digest = Digest::new(b"other manifest");
        assert_eq!(
            verify_chain(&[forged, middle, anchor]),
            Err(CertificateError::InvalidSignature(0))
        );
    }

    #[test]
    fn validity_window() {
        let validity = ValidityPeriod {
            not_before: 100,
            not_after: 200,
        };
        assert!(validity.covers(100));
        assert!(validity.covers(150));
        assert!(!validity.covers(99));
        assert!(!validity.covers(201));
        assert!(ValidityPeriod::default().covers(u64::MAX));
    }

    #[test]
    fn cbor_round_trip() {
        let authority = PrivateKey::new();
        let certificate = identity_certificate(7, &PrivateKey::new(), &authority);

        let bytes = certificate.to_bytes();
        let decoded: IdentityCertificate = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(decoded, certificate);
        assert!(decoded.verify());
    }
}
