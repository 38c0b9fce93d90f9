// SPDX-License-Identifier: MIT OR Apache-2.0

//! The authorization evaluator.
//!
//! `authorize` is a pure function over the local policy, the local manifest and the
//! authenticated facts about the remote peer. The same function runs on both endpoints of an
//! operation: the sender evaluates with [`Direction::Outgoing`] against its own state, the
//! receiver with [`Direction::Incoming`] against its own. An operation succeeds end-to-end iff
//! both verdicts allow it.
//!
//! Which action bit a check requires depends on the operation kind and the direction. The
//! mapping is intentionally asymmetric: a policy names what the *remote* peer is allowed to do,
//! a manifest names what the *local* application does, so the manifest requirement is the
//! policy requirement of the opposite direction.
use peerbus_core::{Guid, PublicKey};
use tracing::debug;

use crate::action::ActionMask;
use crate::pattern;
use crate::policy::{Manifest, Member, MemberType, Peer, Policy, Rule};

/// Which side of the bus an evaluation runs on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// The local application sends the operation.
    Outgoing,

    /// The local application receives the operation.
    Incoming,
}

impl Direction {
    /// The other side of the same operation.
    pub fn opposite(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
        }
    }
}

/// Kind of bus operation under evaluation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperationKind {
    MethodCall,
    GetProperty,
    SetProperty,
    Signal,
}

impl OperationKind {
    /// Member type a rule entry must carry to cover this kind, besides `NotSpecified`.
    pub fn member_type(self) -> MemberType {
        match self {
            Self::MethodCall => MemberType::MethodCall,
            Self::GetProperty | Self::SetProperty => MemberType::Property,
            Self::Signal => MemberType::Signal,
        }
    }
}

/// One concrete operation on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusOperation<'a> {
    pub object_path: &'a str,
    pub interface_name: &'a str,
    pub member_name: &'a str,
    pub kind: OperationKind,
}

/// Authenticated facts about the remote peer, produced by the session authentication layer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PeerAuthInfo {
    /// Authenticated public key, `None` when the peer came in over the anonymous mechanism.
    pub public_key: Option<PublicKey>,

    /// Peer authenticated with a persistent identity.
    pub trusted: bool,

    /// Issuer keys of the peer's identity certificate chain.
    pub issuers: Vec<PublicKey>,

    /// Security group memberships the peer proved, each with the certifying authority.
    pub memberships: Vec<(Guid, PublicKey)>,
}

impl PeerAuthInfo {
    /// Auth info of a peer which came in over the anonymous mechanism.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Decision of the evaluator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Verdict {
    pub allowed: bool,

    /// Action bits the policy accumulated for the operation, zero when a deny entry vetoed it.
    pub granted: ActionMask,
}

impl Verdict {
    fn deny() -> Self {
        Self {
            allowed: false,
            granted: ActionMask::NONE,
        }
    }
}

/// Action bits the local policy must grant for the operation to pass.
fn required_policy(direction: Direction, kind: OperationKind) -> ActionMask {
    match (direction, kind) {
        (Direction::Outgoing, OperationKind::MethodCall) => ActionMask::PROVIDE,
        (Direction::Incoming, OperationKind::MethodCall) => ActionMask::MODIFY,
        (Direction::Outgoing, OperationKind::GetProperty) => ActionMask::PROVIDE,
        (Direction::Incoming, OperationKind::GetProperty) => ActionMask::OBSERVE,
        (Direction::Outgoing, OperationKind::SetProperty) => ActionMask::PROVIDE,
        (Direction::Incoming, OperationKind::SetProperty) => ActionMask::MODIFY,
        (Direction::Outgoing, OperationKind::Signal) => ActionMask::OBSERVE,
        (Direction::Incoming, OperationKind::Signal) => ActionMask::PROVIDE | ActionMask::MODIFY,
    }
}

/// Action bits the local manifest must grant: the policy requirement of the opposite side.
fn required_manifest(direction: Direction, kind: OperationKind) -> ActionMask {
    required_policy(direction.opposite(), kind)
}

fn peer_applies(predicate: &Peer, peer: &PeerAuthInfo) -> bool {
    match predicate {
        Peer::All => true,
        Peer::AnyTrusted => peer.trusted,
        Peer::FromCertificateAuthority(ca_key) => peer.issuers.contains(ca_key),
        Peer::WithPublicKey(key) => peer.public_key.as_ref() == Some(key),
        Peer::WithMembership { group, authority } => peer
            .memberships
            .iter()
            .any(|(held_group, held_authority)| held_group == group && held_authority == authority),
    }
}

/// Predicates naming concrete key material. Only their ACLs can carry an effective deny.
fn is_key_carrying(predicate: &Peer) -> bool {
    matches!(
        predicate,
        Peer::FromCertificateAuthority(_) | Peer::WithPublicKey(_) | Peer::WithMembership { .. }
    )
}

fn rule_covers(rule: &Rule, operation: &BusOperation) -> bool {
    pattern::matches(&rule.object_path, operation.object_path)
        && pattern::matches(&rule.interface_name, operation.interface_name)
}

fn member_covers(member: &Member, operation: &BusOperation) -> bool {
    pattern::matches(&member.name, operation.member_name)
        && match member.member_type {
            MemberType::NotSpecified => true,
            member_type => member_type == operation.kind.member_type(),
        }
}

/// Action bits the manifest grants for the operation. Deny entries in a manifest are always
/// ignored, a manifest narrows only by omission.
fn manifest_mask(manifest: &Manifest, operation: &BusOperation) -> ActionMask {
    let mut mask = ActionMask::NONE;
    for rule in &manifest.rules {
        if !rule_covers(rule, operation) {
            continue;
        }
        for member in &rule.members {
            if member_covers(member, operation) {
                mask |= member.action_mask;
            }
        }
    }
    mask
}

/// Evaluates one bus operation against the local policy and manifest.
///
/// Every ACL whose peer predicates match the remote peer contributes: non-empty action masks of
/// matching members are accumulated, an empty mask on a *named* member under a key-carrying
/// predicate records a hard veto. Wildcard-name deny entries never take effect, nor does any
/// deny under an `All` or `AnyTrusted` ACL.
pub fn authorize(
    direction: Direction,
    operation: &BusOperation,
    policy: &Policy,
    manifest: &Manifest,
    peer: &PeerAuthInfo,
) -> Verdict {
    let mut policy_mask = ActionMask::NONE;
    let mut vetoed = false;

    for acl in &policy.acls {
        let mut applies = false;
        let mut deny_capable = false;
        for predicate in &acl.peers {
            if peer_applies(predicate, peer) {
                applies = true;
                deny_capable |= is_key_carrying(predicate);
            }
        }
        if !applies {
            continue;
        }

        for rule in &acl.rules {
            if !rule_covers(rule, operation) {
                continue;
            }
            for member in &rule.members {
                if !member_covers(member, operation) {
                    continue;
                }
                if member.action_mask.is_empty() {
                    if deny_capable && member.name != "*" {
                        vetoed = true;
                    }
                } else {
                    policy_mask |= member.action_mask;
                }
            }
        }
    }

    if vetoed {
        debug!(
            path = operation.object_path,
            interface = operation.interface_name,
            member = operation.member_name,
            "explicit deny entry vetoes operation"
        );
        return Verdict::deny();
    }

    let policy_ok = policy_mask.intersects(required_policy(direction, operation.kind));
    let manifest_ok =
        manifest_mask(manifest, operation).intersects(required_manifest(direction, operation.kind));

    let allowed = policy_ok && manifest_ok;
    if !allowed {
        debug!(
            path = operation.object_path,
            member = operation.member_name,
            granted = %policy_mask,
            policy_ok,
            manifest_ok,
            "operation not authorized"
        );
    }

    Verdict {
        allowed,
        granted: policy_mask,
    }
}

/// Evaluates a get-all-properties request property by property.
///
/// Every property is checked exactly like a single property read on its name; the return value
/// is the subset this endpoint authorizes. The bus layer intersects the subsets of both
/// endpoints and turns an empty result into a permission denied error reply.
pub fn authorize_get_all_properties<'a>(
    direction: Direction,
    object_path: &str,
    interface_name: &str,
    properties: &[&'a str],
    policy: &Policy,
    manifest: &Manifest,
    peer: &PeerAuthInfo,
) -> Vec<&'a str> {
    properties
        .iter()
        .copied()
        .filter(|property| {
            let operation = BusOperation {
                object_path,
                interface_name,
                member_name: property,
                kind: OperationKind::GetProperty,
            };
            authorize(direction, &operation, policy, manifest, peer).allowed
        })
        .collect()
}
