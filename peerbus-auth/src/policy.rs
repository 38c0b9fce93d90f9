// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission policy data model: rules over interface members, peer predicates, ACLs and the
//! self-declared manifest.
use peerbus_core::cbor::encode_cbor;
use peerbus_core::{Digest, Guid, PublicKey};
use serde::{Deserialize, Serialize};

use crate::action::ActionMask;
use crate::pattern::{self, PatternError};

/// Interface name of the management surface, referenced by the generated default policy.
pub const MANAGEMENT_INTERFACE: &str = "org.peerbus.Security.ManagedApplication";

/// Kind of interface member a rule entry names.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MemberType {
    /// Matches members of any kind. A named member with this type is the construct used for an
    /// explicit deny on a bare member name.
    NotSpecified,
    MethodCall,
    Signal,
    Property,
}

/// One named member of a rule with the actions granted on it.
///
/// An empty action mask is an explicit deny entry, see [`crate::evaluate`] for when deny
/// entries take effect.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub member_type: MemberType,
    pub action_mask: ActionMask,
}

impl Member {
    pub fn new(name: impl Into<String>, member_type: MemberType, action_mask: ActionMask) -> Self {
        Self {
            name: name.into(),
            member_type,
            action_mask,
        }
    }
}

/// Permission rule covering members of one interface on one object path.
///
/// Both the object path and the interface name must match an operation for the rule to apply.
/// A rule without members matches nothing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub object_path: String,
    pub interface_name: String,
    pub members: Vec<Member>,
}

impl Rule {
    pub fn new(
        object_path: impl Into<String>,
        interface_name: impl Into<String>,
        members: Vec<Member>,
    ) -> Self {
        Self {
            object_path: object_path.into(),
            interface_name: interface_name.into(),
            members,
        }
    }

    /// Validates every pattern the rule carries.
    pub fn validate(&self) -> Result<(), PatternError> {
        pattern::validate(&self.object_path)?;
        pattern::validate(&self.interface_name)?;
        for member in &self.members {
            pattern::validate(&member.name)?;
        }
        Ok(())
    }
}

/// Predicate deciding whether an ACL applies to an authenticated peer.
///
/// Predicates own the key material they match against; matching is by equality against the
/// evaluation-time peer auth info.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Peer {
    /// Applies to every peer, the anonymous ones included.
    All,

    /// Applies to peers which authenticated with a persistent identity.
    AnyTrusted,

    /// Applies to peers whose identity certificate chain contains this issuer key.
    FromCertificateAuthority(PublicKey),

    /// Applies to the peer holding exactly this public key.
    WithPublicKey(PublicKey),

    /// Applies to peers holding a membership in the group, certified by the authority.
    WithMembership { group: Guid, authority: PublicKey },
}

/// Access control list entry: who it applies to and what it grants or denies.
///
/// Peers are OR-matched. An ACL without peer predicates applies to no one.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Acl {
    pub peers: Vec<Peer>,
    pub rules: Vec<Rule>,
}

/// Installed permission policy: ordered ACLs with a version for monotonic updates.
///
/// Every ACL matching a peer contributes to a decision; later entries never override earlier
/// ones.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    pub acls: Vec<Acl>,
}

impl Policy {
    /// Validates every rule pattern in every ACL.
    pub fn validate(&self) -> Result<(), PatternError> {
        for acl in &self.acls {
            for rule in &acl.rules {
                rule.validate()?;
            }
        }
        Ok(())
    }
}

/// Self-declared capability ceiling of the local application.
///
/// Conceptually a policy with a single implicit all-peers ACL. The manifest is bound into the
/// identity certificate by the digest of its canonical encoding and replaced wholesale on
/// identity updates, never partially mutated.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub rules: Vec<Rule>,
}

impl Manifest {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Validates every rule pattern.
    pub fn validate(&self) -> Result<(), PatternError> {
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }

    /// Digest of the canonical encoding, the value bound into identity certificates.
    pub fn digest(&self) -> Digest {
        let bytes = encode_cbor(self).expect("CBOR encoder failed due to an critical IO error");
        Digest::new(&bytes)
    }
}

/// Builds the policy installed at claim time and restored by `remove_policy`.
///
/// Admin group members get full access; the certificate authority entry records the issuer
/// without granting anything; the admin authority itself may push memberships through the
/// management surface.
pub fn default_policy(admin_group: Guid, admin_authority: PublicKey, ca_key: PublicKey) -> Policy {
    Policy {
        version: 1,
        acls: vec![
            Acl {
                peers: vec![Peer::WithMembership {
                    group: admin_group,
                    authority: admin_authority,
                }],
                rules: vec![Rule::new(
                    "*",
                    "*",
                    vec![Member::new("*", MemberType::NotSpecified, ActionMask::ALL)],
                )],
            },
            Acl {
                peers: vec![Peer::FromCertificateAuthority(ca_key)],
                rules: vec![],
            },
            Acl {
                peers: vec![Peer::WithPublicKey(admin_authority)],
                rules: vec![Rule::new(
                    "*",
                    MANAGEMENT_INTERFACE,
                    vec![Member::new(
                        "InstallMembership",
                        MemberType::MethodCall,
                        ActionMask::MODIFY,
                    )],
                )],
            },
        ],
    }
}

/// Prepends selected entries of the default policy ahead of a custom policy's ACLs.
///
/// Entries are selected by peer predicate type: the certificate authority entry, the admin
/// group entry and the install membership entry of the generated default can each be kept
/// individually. The result carries the custom policy's version.
pub fn merge_with_default(
    default: &Policy,
    custom: &Policy,
    keep_ca_entry: bool,
    keep_admin_group_entry: bool,
    keep_install_membership_entry: bool,
) -> Policy {
    let mut acls = Vec::new();
    for acl in &default.acls {
        let keep = acl.peers.iter().any(|peer| match peer {
            Peer::FromCertificateAuthority(_) => keep_ca_entry,
            Peer::WithMembership { .. } => keep_admin_group_entry,
            Peer::WithPublicKey(_) => keep_install_membership_entry,
            Peer::All | Peer::AnyTrusted => false,
        });
        if keep {
            acls.push(acl.clone());
        }
    }
    acls.extend(custom.acls.iter().cloned());

    Policy {
        version: custom.version,
        acls,
    }
}
