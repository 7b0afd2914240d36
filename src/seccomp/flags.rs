//! Policy flag bitset.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Serialize, Serializer};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PolicyFlags(u32);

impl PolicyFlags {
    pub const DENY_NAMESPACE: Self = Self(1 << 0);
    pub const DENY_TTY: Self = Self(1 << 1);
    pub const DENY_DEVEL: Self = Self(1 << 2);
    pub const ALLOW_SECONDARY_ARCH: Self = Self(1 << 3);
    /// Sandboxed program runs under the `PER_LINUX32` personality.
    pub const LINUX32: Self = Self(1 << 4);
    pub const ALLOW_CAN: Self = Self(1 << 5);
    pub const ALLOW_BLUETOOTH: Self = Self(1 << 6);
    pub const EXTENDED: Self = Self(1 << 7);
    pub const VERBOSE: Self = Self(1 << 8);

    pub const STRICT: Self = Self::EXTENDED
        .union(Self::DENY_NAMESPACE)
        .union(Self::DENY_TTY)
        .union(Self::DENY_DEVEL);

    const NAMES: [(Self, &'static str); 9] = [
        (Self::DENY_NAMESPACE, "deny_namespace"),
        (Self::DENY_TTY, "deny_tty"),
        (Self::DENY_DEVEL, "deny_devel"),
        (Self::ALLOW_SECONDARY_ARCH, "allow_secondary_arch"),
        (Self::LINUX32, "linux32"),
        (Self::ALLOW_CAN, "allow_can"),
        (Self::ALLOW_BLUETOOTH, "allow_bluetooth"),
        (Self::EXTENDED, "extended"),
        (Self::VERBOSE, "verbose"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for PolicyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PolicyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PolicyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("PolicyFlags(empty)");
        }
        f.write_str("PolicyFlags(")?;
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

impl Serialize for PolicyFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}
