// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point owning the configurator and its collaborators.
//!
//! A bus implementation constructs one context per application: it loads or generates the
//! long-term keypair, brings up the configurator over the same store and fronts it with the
//! management-call gate deciding which remote peer may invoke which operation. The
//! configurator re-checks its own state guards regardless of the gate's decision.
use std::sync::Arc;

use peerbus_core::{Guid, KeyBlob, KeyStore, PrivateKey, StoreId};
use tracing::debug;

use crate::action::ActionMask;
use crate::configurator::{Configurator, SecurityError, TrustAnchorUse};
use crate::evaluate::{self, BusOperation, Direction, PeerAuthInfo, Verdict};
use crate::traits::{ChainVerifier, LocalChainVerifier};

/// Store entry kind the application's long-term keypair is persisted under.
const KEY_STORE_KIND: &str = "local-key";

/// Management operation a remote peer asks to invoke.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ManagementOp {
    Claim,
    InstallPolicy,
    RemovePolicy,
    InstallMembership,
    RemoveMembership,
    UpdateIdentity,
    Reset,
    SetApplicationState,
    Read,
}

/// Security context of one application.
#[derive(Clone)]
pub struct SecurityContext<ST> {
    configurator: Configurator<ST>,
}

impl<ST> SecurityContext<ST>
where
    ST: KeyStore,
{
    /// Brings up the security context over a store.
    ///
    /// The application's keypair is loaded from the store, generating and persisting a fresh
    /// one on first use.
    pub fn new(guid: Guid, store: ST) -> Result<Self, SecurityError<ST>> {
        Self::with_verifier(guid, store, Arc::new(LocalChainVerifier))
    }

    /// Like [`SecurityContext::new`] with a custom certificate chain verifier.
    pub fn with_verifier(
        guid: Guid,
        store: ST,
        verifier: Arc<dyn ChainVerifier>,
    ) -> Result<Self, SecurityError<ST>> {
        let keypair = load_or_generate_keypair(&store, guid)?;
        let configurator = Configurator::with_verifier(guid, keypair, store, verifier)?;
        Ok(Self { configurator })
    }

    /// The managed security state behind this context.
    pub fn configurator(&self) -> &Configurator<ST> {
        &self.configurator
    }

    /// Evaluates a bus operation, treating an application without installed policy and
    /// manifest as unrestricted.
    pub fn authorize(
        &self,
        direction: Direction,
        operation: &BusOperation,
        peer: &PeerAuthInfo,
    ) -> Verdict {
        match self.configurator.authorize(direction, operation, peer) {
            Some(verdict) => verdict,
            None => Verdict {
                allowed: true,
                granted: ActionMask::NONE,
            },
        }
    }

    /// Decides whether a remote peer may invoke a management operation.
    ///
    /// Claiming is open to anyone as long as the application holds no trust anchors yet.
    /// Read-side operations are always allowed. Everything else requires the caller to prove
    /// membership in the admin group installed at claim time.
    pub fn authorize_management_call(
        &self,
        caller: &PeerAuthInfo,
        op: ManagementOp,
    ) -> Result<(), SecurityError<ST>> {
        match op {
            ManagementOp::Read => Ok(()),
            ManagementOp::Claim => {
                if self.configurator.trust_anchors().is_empty() {
                    Ok(())
                } else {
                    Err(SecurityError::PermissionDenied)
                }
            }
            _ => {
                if self.caller_is_admin(caller) {
                    Ok(())
                } else {
                    debug!(?op, "management call rejected, caller is no admin");
                    Err(SecurityError::PermissionDenied)
                }
            }
        }
    }

    fn caller_is_admin(&self, caller: &PeerAuthInfo) -> bool {
        self.configurator.trust_anchors().iter().any(|anchor| {
            anchor.anchor_use == TrustAnchorUse::AdminGroup
                && anchor.group.is_some_and(|group| {
                    caller
                        .memberships
                        .iter()
                        .any(|(held_group, held_authority)| {
                            *held_group == group && *held_authority == anchor.key
                        })
                })
        })
    }

    /// Authorizes a get-all-properties request on this endpoint.
    ///
    /// Returns the subset of properties this side authorizes. A request where nothing is
    /// authorized fails with `PermissionDenied`, matching the error reply the bus sends back
    /// for it.
    pub fn filter_get_all_properties<'a>(
        &self,
        direction: Direction,
        object_path: &str,
        interface_name: &str,
        properties: &[&'a str],
        peer: &PeerAuthInfo,
    ) -> Result<Vec<&'a str>, SecurityError<ST>> {
        let (policy, manifest) = match (self.configurator.policy(), self.configurator.manifest())
        {
            (Some(policy), Some(manifest)) => (policy, manifest),
            _ => return Ok(properties.to_vec()),
        };

        let authorized = evaluate::authorize_get_all_properties(
            direction,
            object_path,
            interface_name,
            properties,
            &policy,
            &manifest,
            peer,
        );
        if authorized.is_empty() && !properties.is_empty() {
            return Err(SecurityError::PermissionDenied);
        }
        Ok(authorized)
    }
}

fn load_or_generate_keypair<ST>(store: &ST, guid: Guid) -> Result<PrivateKey, SecurityError<ST>>
where
    ST: KeyStore,
{
    let id = StoreId::new(guid, KEY_STORE_KIND);
    match store.get(&id).map_err(SecurityError::Storage)? {
        Some(blob) => Ok(blob.decode()?),
        None => {
            let keypair = PrivateKey::new();
            let blob = KeyBlob::encode(&keypair)
                .expect("CBOR encoder failed due to an critical IO error");
            store.store(id, blob).map_err(SecurityError::Storage)?;
            debug!(guid = %guid, "generated fresh application keypair");
            Ok(keypair)
        }
    }
}

#[cfg(test)]
mod tests {
    use peerbus_core::{Guid, KeyStore, MemoryKeyStore, PrivateKey, StoreId};

    use crate::action::ActionMask;
    use crate::evaluate::{BusOperation, Direction, OperationKind, PeerAuthInfo};
    use crate::policy::MemberType;
    use crate::test_utils::{
        IFACE, PATH, anonymous_peer, claim_request, open_manifest, policy_granting, private_key,
        setup_logging, trusted_peer,
    };

    use super::{KEY_STORE_KIND, ManagementOp, SecurityContext, SecurityError};

    fn context_over(store: MemoryKeyStore) -> SecurityContext<MemoryKeyStore> {
        SecurityContext::new(Guid::from_bytes([1; 16]), store).expect("bring up security context")
    }

    /// Claims the context's application, returning the admin authority and group.
    fn claim(context: &SecurityContext<MemoryKeyStore>) -> (PrivateKey, Guid) {
        let authority = private_key(20);
        let admin_group = Guid::from_bytes([2; 16]);
        context
            .configurator()
            .set_manifest_template(open_manifest().rules)
            .unwrap();
        context
            .configurator()
            .claim(claim_request(
                context.configurator().public_key(),
                &authority,
                admin_group,
            ))
            .unwrap();
        (authority, admin_group)
    }

    fn admin_peer(authority: &PrivateKey, admin_group: Guid) -> PeerAuthInfo {
        PeerAuthInfo {
            public_key: Some(private_key(30).public_key()),
            trusted: true,
            issuers: Vec::new(),
            memberships: vec![(admin_group, authority.public_key())],
        }
    }

    #[test]
    fn keypair_persists_across_contexts() {
        let store = MemoryKeyStore::new();
        let first = context_over(store.clone());
        let second = context_over(store.clone());
        assert_eq!(
            first.configurator().public_key(),
            second.configurator().public_key()
        );

        let id = StoreId::new(Guid::from_bytes([1; 16]), KEY_STORE_KIND);
        assert!(store.get(&id).unwrap().is_some());
    }

    #[test]
    fn unconfigured_application_is_unrestricted() {
        let context = context_over(MemoryKeyStore::new());
        let operation = BusOperation {
            object_path: PATH,
            interface_name: IFACE,
            member_name: "Open",
            kind: OperationKind::MethodCall,
        };

        let verdict = context.authorize(Direction::Incoming, &operation, &anonymous_peer());
        assert!(verdict.allowed);
        assert_eq!(verdict.granted, ActionMask::NONE);

        // Once claimed the installed policy takes over.
        let (authority, admin_group) = claim(&context);
        let verdict = context.authorize(Direction::Incoming, &operation, &anonymous_peer());
        assert!(!verdict.allowed);
        let verdict = context.authorize(
            Direction::Incoming,
            &operation,
            &admin_peer(&authority, admin_group),
        );
        assert!(verdict.allowed);
    }

    #[test]
    fn management_gate() {
        setup_logging();
        let context = context_over(MemoryKeyStore::new());

        // While unclaimed anyone may claim and read, nobody may manage.
        assert!(
            context
                .authorize_management_call(&anonymous_peer(), ManagementOp::Claim)
                .is_ok()
        );
        assert!(
            context
                .authorize_management_call(&anonymous_peer(), ManagementOp::Read)
                .is_ok()
        );
        assert!(matches!(
            context.authorize_management_call(&anonymous_peer(), ManagementOp::InstallPolicy),
            Err(SecurityError::PermissionDenied)
        ));

        let (authority, admin_group) = claim(&context);

        // Claimed: claiming closes, admins manage, reads stay open.
        assert!(matches!(
            context.authorize_management_call(&anonymous_peer(), ManagementOp::Claim),
            Err(SecurityError::PermissionDenied)
        ));
        let admin = admin_peer(&authority, admin_group);
        for op in [
            ManagementOp::InstallPolicy,
            ManagementOp::RemovePolicy,
            ManagementOp::InstallMembership,
            ManagementOp::RemoveMembership,
            ManagementOp::UpdateIdentity,
            ManagementOp::Reset,
            ManagementOp::SetApplicationState,
        ] {
            assert!(context.authorize_management_call(&admin, op).is_ok());
        }

        // Membership in some other group does not qualify.
        let outsider = PeerAuthInfo {
            public_key: Some(private_key(31).public_key()),
            trusted: true,
            issuers: Vec::new(),
            memberships: vec![(Guid::from_bytes([9; 16]), authority.public_key())],
        };
        assert!(matches!(
            context.authorize_management_call(&outsider, ManagementOp::InstallPolicy),
            Err(SecurityError::PermissionDenied)
        ));
        assert!(
            context
                .authorize_management_call(&outsider, ManagementOp::Read)
                .is_ok()
        );
    }

    #[test]
    fn get_all_properties_filtering() {
        let context = context_over(MemoryKeyStore::new());
        let properties = ["State", "Version"];

        // Unconfigured applications filter nothing.
        let subset = context
            .filter_get_all_properties(
                Direction::Incoming,
                PATH,
                IFACE,
                &properties,
                &anonymous_peer(),
            )
            .unwrap();
        assert_eq!(subset, vec!["State", "Version"]);

        claim(&context);
        let peer = trusted_peer(private_key(2).public_key());

        // The installed policy narrows the reply to what it grants.
        let mut policy = policy_granting("State", MemberType::Property, ActionMask::OBSERVE);
        policy.version = 2;
        context.configurator().install_policy(policy).unwrap();
        let subset = context
            .filter_get_all_properties(Direction::Incoming, PATH, IFACE, &properties, &peer)
            .unwrap();
        assert_eq!(subset, vec!["State"]);

        // Nothing authorized at all is an error reply.
        let mut policy = policy_granting("Open", MemberType::MethodCall, ActionMask::ALL);
        policy.version = 3;
        context.configurator().install_policy(policy).unwrap();
        assert!(matches!(
            context.filter_get_all_properties(
                Direction::Incoming,
                PATH,
                IFACE,
                &properties,
                &peer,
            ),
            Err(SecurityError::PermissionDenied)
        ));
    }

    #[test]
    fn get_all_properties_end_to_end_intersection() {
        let caller = context_over(MemoryKeyStore::new());
        let callee =
            SecurityContext::new(Guid::from_bytes([7; 16]), MemoryKeyStore::new()).unwrap();
        claim(&caller);
        callee
            .configurator()
            .set_manifest_template(open_manifest().rules)
            .unwrap();
        callee
            .configurator()
            .claim(claim_request(
                callee.configurator().public_key(),
                &private_key(20),
                Guid::from_bytes([2; 16]),
            ))
            .unwrap();

        // The caller grants itself property reads towards any trusted peer.
        let mut policy = policy_granting("*", MemberType::Property, ActionMask::PROVIDE);
        policy.version = 2;
        caller.configurator().install_policy(policy).unwrap();

        // The callee's policy only grants reading "Version".
        let mut policy = policy_granting("Version", MemberType::Property, ActionMask::OBSERVE);
        policy.version = 2;
        callee.configurator().install_policy(policy).unwrap();

        let properties = ["State", "Version"];
        let caller_subset = caller
            .filter_get_all_properties(
                Direction::Outgoing,
                PATH,
                IFACE,
                &properties,
                &trusted_peer(callee.configurator().public_key()),
            )
            .unwrap();
        assert_eq!(caller_subset, vec!["State", "Version"]);

        // The receiving side filters the caller's request down to the overlap.
        let reply = callee
            .filter_get_all_properties(
                Direction::Incoming,
                PATH,
                IFACE,
                &caller_subset,
                &trusted_peer(caller.configurator().public_key()),
            )
            .unwrap();
        assert_eq!(reply, vec!["Version"]);
    }
}
