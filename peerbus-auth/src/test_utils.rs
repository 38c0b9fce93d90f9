// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for the test suites in this crate.
use peerbus_core::{
    Guid, IdentityCertificate, MembershipCertificate, MemoryKeyStore, PrivateKey, PublicKey,
    ValidityPeriod,
};

use crate::action::ActionMask;
use crate::configurator::{ClaimMechanism, ClaimRequest, Configurator};
use crate::evaluate::PeerAuthInfo;
use crate::policy::{Acl, Manifest, Member, MemberType, Peer, Policy, Rule};

pub const PATH: &str = "/control/door";
pub const IFACE: &str = "net.example.control.Door";

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Deterministic key material so assertions stay reproducible.
pub fn private_key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[seed; 32])
}

pub fn trusted_peer(public_key: PublicKey) -> PeerAuthInfo {
    PeerAuthInfo {
        public_key: Some(public_key),
        trusted: true,
        issuers: Vec::new(),
        memberships: Vec::new(),
    }
}

pub fn anonymous_peer() -> PeerAuthInfo {
    PeerAuthInfo::anonymous()
}

/// Manifest declaring everything on every interface.
pub fn open_manifest() -> Manifest {
    Manifest::new(vec![Rule::new("*", "*", vec![Member::new(
        "*",
        MemberType::NotSpecified,
        ActionMask::ALL,
    )])])
}

/// Manifest with a single member entry on the test interface.
pub fn manifest_granting(member: &str, member_type: MemberType, mask: ActionMask) -> Manifest {
    Manifest::new(vec![Rule::new(PATH, IFACE, vec![Member::new(
        member,
        member_type,
        mask,
    )])])
}

/// Policy with a single member entry under an any-trusted ACL.
pub fn policy_granting(member: &str, member_type: MemberType, mask: ActionMask) -> Policy {
    Policy {
        version: 2,
        acls: vec![Acl {
            peers: vec![Peer::AnyTrusted],
            rules: vec![Rule::new(PATH, IFACE, vec![Member::new(
                member,
                member_type,
                mask,
            )])],
        }],
    }
}

/// Single-certificate identity chain issued directly by the authority.
pub fn identity_chain_for(
    subject: PublicKey,
    issuer: &PrivateKey,
    manifest: &Manifest,
) -> Vec<IdentityCertificate> {
    let mut certificate = IdentityCertificate {
        serial: 1,
        subject,
        alias: "app".to_string(),
        issuer: issuer.public_key(),
        manifest_digest: manifest.digest(),
        validity: ValidityPeriod::default(),
        signature: None,
    };
    certificate.sign(issuer);
    vec![certificate]
}

/// Single-certificate membership chain issued directly by the group authority.
pub fn membership_chain(
    subject: PublicKey,
    group: Guid,
    authority: &PrivateKey,
    serial: u64,
) -> Vec<MembershipCertificate> {
    let mut certificate = MembershipCertificate {
        serial,
        subject,
        group,
        issuer: authority.public_key(),
        validity: ValidityPeriod::default(),
        signature: None,
    };
    certificate.sign(authority);
    vec![certificate]
}

/// Claim request where one authority acts as certificate authority and admin group authority.
pub fn claim_request(
    subject: PublicKey,
    authority: &PrivateKey,
    admin_group: Guid,
) -> ClaimRequest {
    let manifest = open_manifest();
    ClaimRequest {
        ca_key: authority.public_key(),
        admin_group,
        admin_authority: authority.public_key(),
        identity_chain: identity_chain_for(subject, authority, &manifest),
        manifest,
        mechanism: ClaimMechanism::EcdheNull,
    }
}

/// Configurator over the given store with a fixed guid and keypair.
pub fn configurator_over(store: MemoryKeyStore) -> Configurator<MemoryKeyStore> {
    Configurator::new(Guid::from_bytes([1; 16]), private_key(10), store)
        .expect("load security state from fresh store")
}

/// Claimed configurator, returning the authority key and admin group it was claimed with.
pub fn claimed_configurator() -> (Configurator<MemoryKeyStore>, PrivateKey, Guid) {
    let configurator = configurator_over(MemoryKeyStore::new());
    configurator
        .set_manifest_template(open_manifest().rules)
        .expect("install manifest template");

    let authority = private_key(20);
    let admin_group = Guid::from_bytes([2; 16]);
    configurator
        .claim(claim_request(
            private_key(10).public_key(),
            &authority,
            admin_group,
        ))
        .expect("claim application");

    (configurator, authority, admin_group)
}
