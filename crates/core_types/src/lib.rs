//! Identity and priority types shared across the workspace.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Opaque handle to a node of externally produced markup.
///
/// Handles are minted by the markup adapter; the engine only stores and
/// compares them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkupHandle(pub u32);

/// Identifies a host container (a root or a portal target).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u32);

/// Set of priority tiers.
///
/// Lower bits are more urgent. A single lane is a `Lanes` value with exactly
/// one bit set; callers use the associated constants rather than raw bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Lanes(pub u32);

impl Lanes {
    pub const NONE: Lanes = Lanes(0);
    pub const SYNC: Lanes = Lanes(1 << 1);
    pub const INPUT_CONTINUOUS: Lanes = Lanes(1 << 3);
    pub const DEFAULT: Lanes = Lanes(1 << 5);
    pub const TRANSITION: Lanes = Lanes(1 << 7);
    pub const RETRY: Lanes = Lanes(1 << 22);
    pub const IDLE: Lanes = Lanes(1 << 28);
    /// Work rendered while hidden; never scheduled on its own.
    pub const OFFSCREEN: Lanes = Lanes(1 << 29);
    pub const ALL: Lanes = Lanes(u32::MAX >> 1);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn merge(self, other: Lanes) -> Lanes {
        Lanes(self.0 | other.0)
    }

    pub const fn remove(self, other: Lanes) -> Lanes {
        Lanes(self.0 & !other.0)
    }

    pub const fn intersects(self, other: Lanes) -> bool {
        self.0 & other.0 != 0
    }

    /// `true` when every lane of `subset` is also in `self`.
    pub const fn includes(self, subset: Lanes) -> bool {
        self.0 & subset.0 == subset.0
    }

    /// Lowest set bit, i.e. the most urgent lane of the set.
    pub const fn highest_priority(self) -> Lanes {
        Lanes(self.0 & self.0.wrapping_neg())
    }
}

impl BitOr for Lanes {
    type Output = Lanes;

    fn bitor(self, rhs: Lanes) -> Lanes {
        self.merge(rhs)
    }
}

impl BitOrAssign for Lanes {
    fn bitor_assign(&mut self, rhs: Lanes) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Lanes {
    type Output = Lanes;

    fn bitand(self, rhs: Lanes) -> Lanes {
        Lanes(self.0 & rhs.0)
    }
}

impl BitAndAssign for Lanes {
    fn bitand_assign(&mut self, rhs: Lanes) {
        self.0 &= rhs.0;
    }
}

impl Not for Lanes {
    type Output = Lanes;

    fn not(self) -> Lanes {
        Lanes(!self.0)
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lanes({:#b})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Lanes;

    #[test]
    fn includes_is_subset_check() {
        let mask = Lanes::SYNC | Lanes::DEFAULT;
        assert!(mask.includes(Lanes::SYNC));
        assert!(mask.includes(Lanes::NONE));
        assert!(!mask.includes(Lanes::TRANSITION));
        assert!(!mask.includes(Lanes::SYNC | Lanes::TRANSITION));
    }

    #[test]
    fn highest_priority_picks_lowest_bit() {
        let lanes = Lanes::IDLE | Lanes::DEFAULT | Lanes::TRANSITION;
        assert_eq!(lanes.highest_priority(), Lanes::DEFAULT);
        assert_eq!(Lanes::NONE.highest_priority(), Lanes::NONE);
    }

    #[test]
    fn remove_clears_only_named_lanes() {
        let lanes = Lanes::SYNC | Lanes::DEFAULT;
        assert_eq!(lanes.remove(Lanes::SYNC), Lanes::DEFAULT);
        assert_eq!(!Lanes::SYNC & lanes, Lanes::DEFAULT);
    }
}
