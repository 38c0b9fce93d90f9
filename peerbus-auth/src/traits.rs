// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the security state and the rest of a bus implementation.
use peerbus_core::{CertificateError, IdentityCertificate, MembershipCertificate, verify_chain};

use crate::configurator::ApplicationState;

/// Validates certificate chains offered during claiming and management operations.
///
/// The default implementation checks signatures and linkage locally. Deployments with
/// revocation lists or an external validation service install their own.
pub trait ChainVerifier: Send + Sync {
    fn verify_identity_chain(&self, chain: &[IdentityCertificate])
    -> Result<(), CertificateError>;

    fn verify_membership_chain(
        &self,
        chain: &[MembershipCertificate],
    ) -> Result<(), CertificateError>;
}

/// Chain verifier checking signatures and linkage without external lookups.
#[derive(Clone, Debug, Default)]
pub struct LocalChainVerifier;

impl ChainVerifier for LocalChainVerifier {
    fn verify_identity_chain(
        &self,
        chain: &[IdentityCertificate],
    ) -> Result<(), CertificateError> {
        verify_chain(chain)
    }

    fn verify_membership_chain(
        &self,
        chain: &[MembershipCertificate],
    ) -> Result<(), CertificateError> {
        verify_chain(chain)
    }
}

/// Callbacks into the bus layer, fired after security state changed.
///
/// Registering a new implementation replaces the previous one.
pub trait BusHooks: Send + Sync {
    /// Established session keys are no longer trustworthy, peers must re-authenticate.
    fn invalidate_session_keys(&self);

    /// The application state changed, announcements should be refreshed.
    fn application_state_changed(&self, state: ApplicationState);
}
