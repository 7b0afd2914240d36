//! Socket address family allow-list.
//!
//! Turned into point and open-ended range denials on `socket(2)`'s first
//! argument so that exactly the listed families stay reachable.

use serde::Serialize;

use super::flags::PolicyFlags;
use super::rule::ArgumentPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SocketFamilyAllowEntry {
    pub family: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<PolicyFlags>,
}

const fn always(family: libc::c_int) -> SocketFamilyAllowEntry {
    SocketFamilyAllowEntry { family: family as u32, required: None }
}

const fn with(family: libc::c_int, flag: PolicyFlags) -> SocketFamilyAllowEntry {
    SocketFamilyAllowEntry { family: family as u32, required: Some(flag) }
}

/// Sorted ascending by family.
pub const SOCKET_FAMILY_ALLOWLIST: &[SocketFamilyAllowEntry] = &[
    always(libc::AF_UNSPEC),
    always(libc::AF_UNIX),
    always(libc::AF_INET),
    always(libc::AF_INET6),
    always(libc::AF_NETLINK),
    with(libc::AF_CAN, PolicyFlags::ALLOW_CAN),
    with(libc::AF_BLUETOOTH, PolicyFlags::ALLOW_BLUETOOTH),
];

/// One blocked slice of the family domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyDenial {
    Point(u32),
    /// Every family from this value upward.
    From(u32),
}

impl FamilyDenial {
    pub const fn predicate(self) -> ArgumentPredicate {
        match self {
            FamilyDenial::Point(family) => ArgumentPredicate::equal(0, family as u64),
            FamilyDenial::From(family) => ArgumentPredicate::greater_or_equal(0, family as u64),
        }
    }

    pub const fn covers(self, family: u64) -> bool {
        match self {
            FamilyDenial::Point(denied) => family == denied as u64,
            FamilyDenial::From(start) => family >= start as u64,
        }
    }
}

/// Denials for every family the allow-list does not admit under `flags`.
pub fn family_denials(table: &[SocketFamilyAllowEntry], flags: PolicyFlags) -> Vec<FamilyDenial> {
    let mut denials = Vec::new();
    let mut next_free: u32 = 0;
    for entry in table {
        if let Some(required) = entry.required {
            if !flags.contains(required) {
                continue;
            }
        }
        denials.extend((next_free..entry.family).map(FamilyDenial::Point));
        next_free = entry.family + 1;
    }
    denials.push(FamilyDenial::From(next_free));
    denials
}
