//! Effect markers recorded on render nodes during a pass.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u32);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Node must be inserted, or moved forward, at commit.
    pub const PLACEMENT: Flags = Flags(1 << 1);
    /// Props or text changed in place.
    pub const UPDATE: Flags = Flags(1 << 2);
    /// `deletions` on this node is non-empty.
    pub const CHILD_DELETION: Flags = Flags(1 << 4);
    /// Applied updates carried callbacks to run at commit.
    pub const CALLBACK: Flags = Flags(1 << 6);
    pub const DID_CAPTURE: Flags = Flags(1 << 7);
    /// Claimed existing external markup instead of being created.
    pub const HYDRATING: Flags = Flags(1 << 12);
    pub const VISIBILITY: Flags = Flags(1 << 13);
    pub const SHOULD_CAPTURE: Flags = Flags(1 << 16);
    /// Subtree diverged from the external markup it was matched against.
    pub const HYDRATION_DIVERGED: Flags = Flags(1 << 17);
    /// Positioned during a mount pass where side effects are not tracked.
    pub const FORKED: Flags = Flags(1 << 20);

    pub const STRUCTURAL: Flags = Flags(Self::PLACEMENT.0 | Self::UPDATE.0 | Self::CHILD_DELETION.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn without(self, other: Flags) -> Flags {
        Flags(self.0 & !other.0)
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

const NAMES: &[(Flags, &str)] = &[
    (Flags::PLACEMENT, "placement"),
    (Flags::UPDATE, "update"),
    (Flags::CHILD_DELETION, "child-deletion"),
    (Flags::CALLBACK, "callback"),
    (Flags::DID_CAPTURE, "did-capture"),
    (Flags::HYDRATING, "hydrating"),
    (Flags::VISIBILITY, "visibility"),
    (Flags::SHOULD_CAPTURE, "should-capture"),
    (Flags::HYDRATION_DIVERGED, "hydration-diverged"),
    (Flags::FORKED, "forked"),
];

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Flags(none)");
        }
        f.write_str("Flags(")?;
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
