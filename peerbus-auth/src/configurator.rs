// SPDX-License-Identifier: MIT OR Apache-2.0

//! Managed security state of a single application.
//!
//! The configurator is the state machine behind the claim lifecycle: which management
//! operations are legal in which application state, what gets installed when an administrator
//! claims the application and how policy, identity and memberships change afterwards.
//!
//! All state lives behind one lock and is persisted as a single blob before a mutation becomes
//! visible, so readers never observe a partial install. Certificate verification and digest
//! computation run before the write lock is taken and never block concurrent authorization.
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use peerbus_core::{
    CertificateError, Digest, Guid, IdentityCertificate, KeyBlob, KeyStore, MembershipCertificate,
    PrivateKey, PublicKey, StoreId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::evaluate::{self, BusOperation, Direction, PeerAuthInfo, Verdict};
use crate::pattern::PatternError;
use crate::policy::{Manifest, Policy, Rule, default_policy};
use crate::traits::{BusHooks, ChainVerifier, LocalChainVerifier};

/// Store entry kind the whole security state is persisted under.
const STORE_KIND: &str = "security";

/// Claim lifecycle state of an application, announced to peers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ApplicationState {
    /// Security is enabled but the application declared no manifest template yet.
    NotClaimable,

    /// The application accepts a claim.
    Claimable,

    /// An administrator claimed the application.
    Claimed,

    /// The application signals that its identity needs to be refreshed.
    NeedUpdate,
}

impl ApplicationState {
    /// Claimed and need-update both mean an administrator owns this application.
    pub fn is_claimed(self) -> bool {
        matches!(self, Self::Claimed | Self::NeedUpdate)
    }
}

/// Key exchange mechanisms the application admits a claim over.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClaimCapabilities(u16);

impl ClaimCapabilities {
    pub const NONE: Self = Self(0);
    pub const ECDHE_NULL: Self = Self(0x01);
    pub const ECDHE_PSK: Self = Self(0x02);
    pub const ECDHE_ECDSA: Self = Self(0x04);
    pub const ECDHE_SPEKE: Self = Self(0x08);
    pub const ALL: Self = Self(0x0f);

    pub fn bits(self) -> u16 {
        self.0
    }

    /// Constructs capabilities from raw bits, ignoring unknown ones.
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ClaimCapabilities {
    fn default() -> Self {
        Self::ECDHE_NULL | Self::ECDHE_PSK | Self::ECDHE_SPEKE
    }
}

impl BitOr for ClaimCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClaimCapabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ClaimCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let mut names = Vec::new();
        if self.contains(Self::ECDHE_NULL) {
            names.push("ecdhe-null");
        }
        if self.contains(Self::ECDHE_PSK) {
            names.push("ecdhe-psk");
        }
        if self.contains(Self::ECDHE_ECDSA) {
            names.push("ecdhe-ecdsa");
        }
        if self.contains(Self::ECDHE_SPEKE) {
            names.push("ecdhe-speke");
        }
        write!(f, "{}", names.join(" | "))
    }
}

impl fmt::Debug for ClaimCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClaimCapabilities({})", self)
    }
}

/// Extra facts about the claim setup, published next to the capabilities.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClaimCapabilityAdditionalInfo(u16);

impl ClaimCapabilityAdditionalInfo {
    pub const PSK_GENERATED_BY_SECURITY_MANAGER: Self = Self(0x01);
    pub const PSK_GENERATED_BY_APPLICATION: Self = Self(0x02);

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits & 0x03)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClaimCapabilityAdditionalInfo {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Key exchange a claim attempt arrived over.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClaimMechanism {
    EcdheNull,
    EcdhePsk,
    EcdheEcdsa,
    EcdheSpeke,
}

impl ClaimMechanism {
    /// Capability bit an application must declare to admit this mechanism.
    pub fn capability(self) -> ClaimCapabilities {
        match self {
            Self::EcdheNull => ClaimCapabilities::ECDHE_NULL,
            Self::EcdhePsk => ClaimCapabilities::ECDHE_PSK,
            Self::EcdheEcdsa => ClaimCapabilities::ECDHE_ECDSA,
            Self::EcdheSpeke => ClaimCapabilities::ECDHE_SPEKE,
        }
    }
}

/// Everything an administrator hands over when claiming an application.
#[derive(Clone, Debug)]
pub struct ClaimRequest {
    /// Authority the claimed application will trust as issuer of identity certificates.
    pub ca_key: PublicKey,

    /// Security group whose members administer the claimed application.
    pub admin_group: Guid,

    /// Authority certifying memberships in the admin group.
    pub admin_authority: PublicKey,

    /// Identity certificate chain for this application, leaf first.
    pub identity_chain: Vec<IdentityCertificate>,

    /// Manifest matching the digest bound into the leaf certificate.
    pub manifest: Manifest,

    /// Key exchange the claim arrived over.
    pub mechanism: ClaimMechanism,
}

/// Role a trust anchor plays.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TrustAnchorUse {
    /// Trusted issuer of identity certificates.
    CertificateAuthority,

    /// Authority of the administrative security group.
    AdminGroup,

    /// Issuer backing an installed membership certificate.
    Membership,
}

/// Public key the application trusts for a specific purpose.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub anchor_use: TrustAnchorUse,
    pub key: PublicKey,

    /// Security group the anchor is scoped to, for admin group and membership anchors.
    pub group: Option<Guid>,
}

/// Identifying facts about one installed membership certificate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MembershipSummary {
    pub serial: u64,
    pub issuer_key_id: Digest,
    pub group: Guid,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct MembershipEntry {
    chain: Vec<MembershipCertificate>,
    auth_data: Option<Policy>,
}

/// Complete security state of an application, persisted as one blob so writes stay atomic.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct SecurityState {
    application_state: ApplicationState,
    claim_capabilities: ClaimCapabilities,
    claim_capability_additional_info: ClaimCapabilityAdditionalInfo,
    manifest_template: Vec<Rule>,
    trust_anchors: Vec<TrustAnchor>,
    policy: Option<Policy>,
    default_policy: Option<Policy>,
    manifest: Option<Manifest>,
    identity_chain: Vec<IdentityCertificate>,
    memberships: BTreeMap<(u64, Digest), MembershipEntry>,
}

impl Default for SecurityState {
    fn default() -> Self {
        Self {
            application_state: ApplicationState::NotClaimable,
            claim_capabilities: ClaimCapabilities::default(),
            claim_capability_additional_info: ClaimCapabilityAdditionalInfo::default(),
            manifest_template: Vec::new(),
            trust_anchors: Vec::new(),
            policy: None,
            default_policy: None,
            manifest: None,
            identity_chain: Vec::new(),
            memberships: BTreeMap::new(),
        }
    }
}

/// Error types of security management operations.
#[derive(Debug, Error)]
pub enum SecurityError<ST>
where
    ST: KeyStore,
{
    #[error("operation is not permitted in the current claim state")]
    InvalidClaimableState,

    #[error("security state holds no data for this operation yet")]
    NotAvailable,

    #[error("caller is not authorized for this operation")]
    PermissionDenied,

    #[error("no stored entry matches the given certificate")]
    KeyUnavailable,

    #[error("manifest digest does not match the digest bound into the leaf certificate")]
    DigestMismatch,

    #[error("invalid rule pattern: {0}")]
    MalformedRule(#[from] PatternError),

    #[error("offered policy version {offered} does not supersede installed version {installed}")]
    PolicyNotNewer { offered: u32, installed: u32 },

    #[error("membership certificate with this serial and issuer is already installed")]
    DuplicateCertificate,

    #[error("certificate validation failed: {0}")]
    Certificate(#[from] CertificateError),

    #[error("persisted security state is not decodable: {0}")]
    Decoding(#[from] peerbus_core::cbor::DecodeError),

    #[error("key store error: {0}")]
    Storage(ST::Error),
}

/// Manages the security state of one application over a key store.
///
/// Cloned handles share the same state and lock.
#[derive(Clone)]
pub struct Configurator<ST> {
    guid: Guid,
    keypair: PrivateKey,
    store: ST,
    verifier: Arc<dyn ChainVerifier>,
    state: Arc<RwLock<SecurityState>>,
    hooks: Arc<RwLock<Option<Box<dyn BusHooks>>>>,
}

impl<ST> Configurator<ST>
where
    ST: KeyStore,
{
    /// Loads persisted security state from the store or begins with a fresh, unclaimable one.
    pub fn new(guid: Guid, keypair: PrivateKey, store: ST) -> Result<Self, SecurityError<ST>> {
        Self::with_verifier(guid, keypair, store, Arc::new(LocalChainVerifier))
    }

    /// Like [`Configurator::new`] with a custom certificate chain verifier.
    pub fn with_verifier(
        guid: Guid,
        keypair: PrivateKey,
        store: ST,
        verifier: Arc<dyn ChainVerifier>,
    ) -> Result<Self, SecurityError<ST>> {
        let state = match store
            .get(&StoreId::new(guid, STORE_KIND))
            .map_err(SecurityError::Storage)?
        {
            Some(blob) => blob.decode()?,
            None => SecurityState::default(),
        };

        Ok(Self {
            guid,
            keypair,
            store,
            verifier,
            state: Arc::new(RwLock::new(state)),
            hooks: Arc::new(RwLock::new(None)),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SecurityState> {
        self.state
            .read()
            .expect("acquire shared read access on security state")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SecurityState> {
        self.state
            .write()
            .expect("acquire exclusive write access on security state")
    }

    fn persist(&self, state: &SecurityState) -> Result<(), SecurityError<ST>> {
        let blob =
            KeyBlob::encode(state).expect("CBOR encoder failed due to an critical IO error");
        self.store
            .store(StoreId::new(self.guid, STORE_KIND), blob)
            .map_err(SecurityError::Storage)
    }

    /// Registers the bus callbacks, replacing a previously registered implementation.
    pub fn register_hooks(&self, hooks: Box<dyn BusHooks>) {
        *self
            .hooks
            .write()
            .expect("acquire exclusive write access on bus hooks") = Some(hooks);
    }

    fn notify_session_keys_invalidated(&self) {
        if let Some(hooks) = self
            .hooks
            .read()
            .expect("acquire shared read access on bus hooks")
            .as_ref()
        {
            hooks.invalidate_session_keys();
        }
    }

    fn notify_state_changed(&self, state: ApplicationState) {
        if let Some(hooks) = self
            .hooks
            .read()
            .expect("acquire shared read access on bus hooks")
            .as_ref()
        {
            hooks.application_state_changed(state);
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Public key of this application, the subject of its identity certificates.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn application_state(&self) -> ApplicationState {
        self.read_state().application_state
    }

    pub fn claim_capabilities(&self) -> ClaimCapabilities {
        self.read_state().claim_capabilities
    }

    pub fn claim_capability_additional_info(&self) -> ClaimCapabilityAdditionalInfo {
        self.read_state().claim_capability_additional_info
    }

    pub fn manifest_template(&self) -> Vec<Rule> {
        self.read_state().manifest_template.clone()
    }

    /// Currently installed policy, none while unclaimed.
    pub fn policy(&self) -> Option<Policy> {
        self.read_state().policy.clone()
    }

    /// Policy generated at claim time, the fallback `remove_policy` returns to.
    pub fn default_policy(&self) -> Option<Policy> {
        self.read_state().default_policy.clone()
    }

    pub fn manifest(&self) -> Option<Manifest> {
        self.read_state().manifest.clone()
    }

    /// Identity certificate chain installed at claim, leaf first. Empty while unclaimed.
    pub fn identity(&self) -> Vec<IdentityCertificate> {
        self.read_state().identity_chain.clone()
    }

    pub fn trust_anchors(&self) -> Vec<TrustAnchor> {
        self.read_state().trust_anchors.clone()
    }

    pub fn membership_summaries(&self) -> Vec<MembershipSummary> {
        self.read_state()
            .memberships
            .iter()
            .filter_map(|((serial, issuer_key_id), entry)| {
                let leaf = entry.chain.first()?;
                Some(MembershipSummary {
                    serial: *serial,
                    issuer_key_id: *issuer_key_id,
                    group: leaf.group,
                })
            })
            .collect()
    }

    /// Auth-data policy attached to an installed membership entry.
    pub fn membership_auth_data(&self, serial: u64, issuer_key_id: Digest) -> Option<Policy> {
        self.read_state()
            .memberships
            .get(&(serial, issuer_key_id))
            .and_then(|entry| entry.auth_data.clone())
    }

    /// Evaluates an operation against the installed policy and manifest.
    ///
    /// Returns `None` while no policy or manifest is installed and there is nothing to
    /// evaluate against.
    pub fn authorize(
        &self,
        direction: Direction,
        operation: &BusOperation,
        peer: &PeerAuthInfo,
    ) -> Option<Verdict> {
        let state = self.read_state();
        let policy = state.policy.as_ref()?;
        let manifest = state.manifest.as_ref()?;
        Some(evaluate::authorize(
            direction, operation, policy, manifest, peer,
        ))
    }

    /// Declares the application's capability template.
    ///
    /// Installing a template is what makes a fresh application claimable.
    pub fn set_manifest_template(&self, rules: Vec<Rule>) -> Result<(), SecurityError<ST>> {
        for rule in &rules {
            rule.validate()?;
        }

        let became_claimable;
        {
            let mut state = self.write_state();
            became_claimable = state.application_state == ApplicationState::NotClaimable;

            let mut updated = state.clone();
            updated.manifest_template = rules;
            if became_claimable {
                updated.application_state = ApplicationState::Claimable;
            }
            self.persist(&updated)?;
            *state = updated;
        }

        if became_claimable {
            info!(guid = %self.guid, "application is claimable");
            self.notify_state_changed(ApplicationState::Claimable);
        }
        Ok(())
    }

    /// Restricts the key exchange mechanisms a claim is admitted over. Rejected once claimed.
    pub fn set_claim_capabilities(
        &self,
        capabilities: ClaimCapabilities,
    ) -> Result<(), SecurityError<ST>> {
        let mut state = self.write_state();
        if state.application_state.is_claimed() {
            return Err(SecurityError::InvalidClaimableState);
        }

        let mut updated = state.clone();
        updated.claim_capabilities = capabilities;
        self.persist(&updated)?;
        *state = updated;
        Ok(())
    }

    /// Publishes extra facts about the claim setup. Rejected once claimed.
    pub fn set_claim_capability_additional_info(
        &self,
        info: ClaimCapabilityAdditionalInfo,
    ) -> Result<(), SecurityError<ST>> {
        let mut state = self.write_state();
        if state.application_state.is_claimed() {
            return Err(SecurityError::InvalidClaimableState);
        }

        let mut updated = state.clone();
        updated.claim_capability_additional_info = info;
        self.persist(&updated)?;
        *state = updated;
        Ok(())
    }

    /// Claims the application for an administrator.
    ///
    /// Verifies that the offered identity chain certifies this application's own key and binds
    /// the digest of the offered manifest, installs the certificate authority and admin group
    /// trust anchors together with the generated default policy and transitions to `Claimed`.
    pub fn claim(&self, request: ClaimRequest) -> Result<(), SecurityError<ST>> {
        {
            let state = self.read_state();
            if state.application_state != ApplicationState::Claimable {
                return Err(SecurityError::InvalidClaimableState);
            }
            if !state
                .claim_capabilities
                .contains(request.mechanism.capability())
            {
                return Err(SecurityError::PermissionDenied);
            }
        }

        // Expensive validation runs without holding the lock.
        request.manifest.validate()?;
        self.verifier.verify_identity_chain(&request.identity_chain)?;
        let leaf = match request.identity_chain.first() {
            Some(leaf) => leaf,
            None => return Err(CertificateError::EmptyChain.into()),
        };
        if leaf.subject != self.keypair.public_key() {
            return Err(CertificateError::WrongSubject(0).into());
        }
        if request.manifest.digest() != leaf.manifest_digest {
            return Err(SecurityError::DigestMismatch);
        }

        {
            let mut state = self.write_state();
            // The state may have moved while validating, check the guards again.
            if state.application_state != ApplicationState::Claimable {
                return Err(SecurityError::InvalidClaimableState);
            }
            if !state
                .claim_capabilities
                .contains(request.mechanism.capability())
            {
                return Err(SecurityError::PermissionDenied);
            }

            let default =
                default_policy(request.admin_group, request.admin_authority, request.ca_key);

            let mut updated = state.clone();
            updated.trust_anchors = vec![
                TrustAnchor {
                    anchor_use: TrustAnchorUse::CertificateAuthority,
                    key: request.ca_key,
                    group: None,
                },
                TrustAnchor {
                    anchor_use: TrustAnchorUse::AdminGroup,
                    key: request.admin_authority,
                    group: Some(request.admin_group),
                },
            ];
            updated.identity_chain = request.identity_chain;
            updated.manifest = Some(request.manifest);
            updated.policy = Some(default.clone());
            updated.default_policy = Some(default);
            updated.application_state = ApplicationState::Claimed;
            self.persist(&updated)?;
            *state = updated;
        }

        info!(guid = %self.guid, "application claimed");
        self.notify_state_changed(ApplicationState::Claimed);
        Ok(())
    }

    /// Installs a new policy, superseding the current one.
    ///
    /// The offered version must be strictly greater than the installed one. A successful
    /// install invalidates all established session keys through the registered bus hooks.
    pub fn install_policy(&self, policy: Policy) -> Result<(), SecurityError<ST>> {
        policy.validate()?;
        let version = policy.version;

        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() {
                return Err(SecurityError::NotAvailable);
            }

            let installed = state
                .policy
                .as_ref()
                .map(|policy| policy.version)
                .unwrap_or(0);
            if version <= installed {
                return Err(SecurityError::PolicyNotNewer {
                    offered: version,
                    installed,
                });
            }

            let mut updated = state.clone();
            updated.policy = Some(policy);
            self.persist(&updated)?;
            *state = updated;
        }

        info!(version, "policy installed");
        self.notify_session_keys_invalidated();
        Ok(())
    }

    /// Drops the installed policy and restores the default policy generated at claim time.
    pub fn remove_policy(&self) -> Result<(), SecurityError<ST>> {
        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() {
                return Err(SecurityError::NotAvailable);
            }

            let mut updated = state.clone();
            updated.policy = updated.default_policy.clone();
            self.persist(&updated)?;
            *state = updated;
        }

        info!("policy removed, default policy restored");
        self.notify_session_keys_invalidated();
        Ok(())
    }

    /// Installs a membership certificate chain proving this application belongs to a group.
    ///
    /// Entries are keyed by serial number and issuer key identifier of the leaf certificate.
    /// The issuer rooting the chain is recorded as a membership trust anchor.
    pub fn install_membership(
        &self,
        chain: Vec<MembershipCertificate>,
    ) -> Result<(), SecurityError<ST>> {
        if !self.read_state().application_state.is_claimed() {
            return Err(SecurityError::NotAvailable);
        }

        self.verifier.verify_membership_chain(&chain)?;
        let (serial, issuer_key_id) = match chain.first() {
            Some(leaf) => {
                if leaf.subject != self.keypair.public_key() {
                    return Err(CertificateError::WrongSubject(0).into());
                }
                (leaf.serial, leaf.issuer_key_id())
            }
            None => return Err(CertificateError::EmptyChain.into()),
        };
        let anchor = membership_anchor(&chain);

        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() {
                return Err(SecurityError::NotAvailable);
            }
            if state.memberships.contains_key(&(serial, issuer_key_id)) {
                return Err(SecurityError::DuplicateCertificate);
            }

            let mut updated = state.clone();
            if let Some(anchor) = anchor {
                if !updated.trust_anchors.contains(&anchor) {
                    updated.trust_anchors.push(anchor);
                }
            }
            updated.memberships.insert(
                (serial, issuer_key_id),
                MembershipEntry {
                    chain,
                    auth_data: None,
                },
            );
            self.persist(&updated)?;
            *state = updated;
        }

        debug!(serial, "membership certificate installed");
        Ok(())
    }

    /// Attaches the auth-data policy associated with an installed membership certificate.
    pub fn install_membership_auth_data(
        &self,
        serial: u64,
        issuer_key_id: Digest,
        auth_data: Policy,
    ) -> Result<(), SecurityError<ST>> {
        auth_data.validate()?;

        let mut state = self.write_state();
        if !state.application_state.is_claimed() {
            return Err(SecurityError::NotAvailable);
        }

        let mut updated = state.clone();
        match updated.memberships.get_mut(&(serial, issuer_key_id)) {
            Some(entry) => entry.auth_data = Some(auth_data),
            None => return Err(SecurityError::KeyUnavailable),
        }
        self.persist(&updated)?;
        *state = updated;
        Ok(())
    }

    /// Removes an installed membership certificate and rebuilds the membership anchors from
    /// the entries which are left.
    pub fn remove_membership(
        &self,
        serial: u64,
        issuer_key_id: Digest,
    ) -> Result<(), SecurityError<ST>> {
        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() {
                return Err(SecurityError::NotAvailable);
            }

            let mut updated = state.clone();
            if updated
                .memberships
                .remove(&(serial, issuer_key_id))
                .is_none()
            {
                return Err(SecurityError::KeyUnavailable);
            }

            updated
                .trust_anchors
                .retain(|anchor| anchor.anchor_use != TrustAnchorUse::Membership);
            for entry in updated.memberships.values() {
                if let Some(anchor) = membership_anchor(&entry.chain) {
                    if !updated.trust_anchors.contains(&anchor) {
                        updated.trust_anchors.push(anchor);
                    }
                }
            }
            self.persist(&updated)?;
            *state = updated;
        }

        debug!(serial, "membership certificate removed");
        Ok(())
    }

    /// Atomically replaces the identity certificate chain and the manifest.
    ///
    /// Fails with `DigestMismatch` and leaves the prior state untouched when the digest of the
    /// offered manifest differs from the digest bound into the leaf certificate.
    pub fn update_identity(
        &self,
        chain: Vec<IdentityCertificate>,
        manifest: Manifest,
    ) -> Result<(), SecurityError<ST>> {
        if !self.read_state().application_state.is_claimed() {
            return Err(SecurityError::NotAvailable);
        }

        manifest.validate()?;
        self.verifier.verify_identity_chain(&chain)?;
        match chain.first() {
            Some(leaf) => {
                if leaf.subject != self.keypair.public_key() {
                    return Err(CertificateError::WrongSubject(0).into());
                }
                if manifest.digest() != leaf.manifest_digest {
                    return Err(SecurityError::DigestMismatch);
                }
            }
            None => return Err(CertificateError::EmptyChain.into()),
        }

        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() {
                return Err(SecurityError::NotAvailable);
            }

            let mut updated = state.clone();
            updated.identity_chain = chain;
            updated.manifest = Some(manifest);
            self.persist(&updated)?;
            *state = updated;
        }

        debug!("identity certificate chain replaced");
        Ok(())
    }

    /// Wipes trust anchors, policy, manifest, identity and memberships.
    ///
    /// The application returns to `Claimable` (`keep_for_claim`) or `NotClaimable`, keeping
    /// its manifest template and claim capabilities either way. Resetting twice leaves the
    /// same state behind as resetting once.
    pub fn reset(&self, keep_for_claim: bool) -> Result<(), SecurityError<ST>> {
        let target = if keep_for_claim {
            ApplicationState::Claimable
        } else {
            ApplicationState::NotClaimable
        };

        let changed;
        {
            let mut state = self.write_state();
            changed = state.application_state != target;

            let mut updated = state.clone();
            updated.application_state = target;
            updated.trust_anchors.clear();
            updated.memberships.clear();
            updated.policy = None;
            updated.default_policy = None;
            updated.manifest = None;
            updated.identity_chain.clear();
            self.persist(&updated)?;
            *state = updated;
        }

        info!(guid = %self.guid, state = ?target, "security state reset");
        self.notify_session_keys_invalidated();
        if changed {
            self.notify_state_changed(target);
        }
        Ok(())
    }

    /// Explicit transition between the claimed states, used by administrators to flag that an
    /// identity refresh is needed.
    pub fn set_application_state(
        &self,
        target: ApplicationState,
    ) -> Result<(), SecurityError<ST>> {
        let changed;
        {
            let mut state = self.write_state();
            if !state.application_state.is_claimed() || !target.is_claimed() {
                return Err(SecurityError::InvalidClaimableState);
            }

            changed = state.application_state != target;
            if changed {
                let mut updated = state.clone();
                updated.application_state = target;
                self.persist(&updated)?;
                *state = updated;
            }
        }

        if changed {
            self.notify_state_changed(target);
        }
        Ok(())
    }
}

/// Trust anchor recorded alongside a membership: the group of the leaf certificate, vouched
/// for by the issuer rooting the chain.
fn membership_anchor(chain: &[MembershipCertificate]) -> Option<TrustAnchor> {
    let leaf = chain.first()?;
    let root = chain.last()?;
    Some(TrustAnchor {
        anchor_use: TrustAnchorUse::Membership,
        key: root.issuer,
        group: Some(leaf.group),
    })
}
