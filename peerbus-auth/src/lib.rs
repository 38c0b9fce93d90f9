// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability-based access control for the peerbus message bus: permission policies over
//! object-path / interface / member patterns, a pure authorization evaluator running the same
//! check on both endpoints of an operation, and the configurator state machine managing the
//! claim, policy and membership lifecycle of an application.
pub mod action;
pub mod configurator;
pub mod context;
pub mod evaluate;
pub mod pattern;
pub mod policy;
#[cfg(test)]
mod test_utils;
pub mod traits;

pub use action::ActionMask;
pub use configurator::{
    ApplicationState, ClaimCapabilities, ClaimCapabilityAdditionalInfo, ClaimMechanism,
    ClaimRequest, Configurator, MembershipSummary, SecurityError, TrustAnchor, TrustAnchorUse,
};
pub use context::{ManagementOp, SecurityContext};
pub use evaluate::{
    BusOperation, Direction, OperationKind, PeerAuthInfo, Verdict, authorize,
    authorize_get_all_properties,
};
pub use pattern::PatternError;
pub use policy::{Acl, Manifest, Member, MemberType, Peer, Policy, Rule};
pub use traits::{BusHooks, ChainVerifier, LocalChainVerifier};
