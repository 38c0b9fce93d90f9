// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of action bits a policy or manifest member grants.
///
/// PROVIDE covers serving an operation (answering method calls and property reads, emitting
/// signals), OBSERVE covers consuming it (reading properties, receiving signals) and MODIFY
/// covers changing state (invoking methods, writing properties). Which bit an operation needs
/// depends on its kind and on which side of the bus the check runs, see [`crate::evaluate`].
///
/// The empty mask is meaningful: a member carrying no action bits is an explicit deny entry.
#[derive(Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionMask(u8);

impl ActionMask {
    /// No actions, the explicit deny marker.
    pub const NONE: Self = Self(0);

    /// Allow to provide: serve method calls, answer property reads, emit signals.
    pub const PROVIDE: Self = Self(0x01);

    /// Allow to observe: read properties, receive signals.
    pub const OBSERVE: Self = Self(0x02);

    /// Allow to modify: invoke method calls, write properties.
    pub const MODIFY: Self = Self(0x04);

    /// All three actions.
    pub const ALL: Self = Self(0x01 | 0x02 | 0x04);

    /// Returns the raw bit representation.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds a mask from raw bits, dropping anything outside the defined range.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Mask carries no bits at all.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Mask carries every bit of `other`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Mask shares at least one bit with `other`.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ActionMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ActionMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ActionMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ActionMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let mut names = Vec::new();
        if self.contains(Self::PROVIDE) {
            names.push("provide");
        }
        if self.contains(Self::OBSERVE) {
            names.push("observe");
        }
        if self.contains(Self::MODIFY) {
            names.push("modify");
        }
        write!(f, "{}", names.join(" | "))
    }
}

impl fmt::Debug for ActionMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActionMask({})", self)
    }
}
