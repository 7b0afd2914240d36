//! Declarative rule types: what the catalog says, before code generation.

use serde::Serialize;

use super::bpf::{SECCOMP_RET_ALLOW, SECCOMP_RET_DATA, SECCOMP_RET_ERRNO, SECCOMP_RET_KILL_PROCESS};
use super::flags::PolicyFlags;
use super::syscalls::Syscall;

/// Highest syscall argument index in `seccomp_data.args`.
pub const MAX_ARG_INDEX: u8 = 5;

/// How a denied syscall fails from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    /// `EPERM`
    PermissionDenied,
    /// `ENOSYS`, so callers fall back to an older interface.
    NotImplemented,
}

impl DenialKind {
    pub const fn errno(self) -> i32 {
        match self {
            DenialKind::PermissionDenied => libc::EPERM,
            DenialKind::NotImplemented => libc::ENOSYS,
        }
    }

    pub const fn action(self) -> Action {
        Action::Errno(self.errno() as u16)
    }
}

/// Filter return action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Allow,
    Errno(u16),
    KillProcess,
}

impl Action {
    pub const fn to_ret(self) -> u32 {
        match self {
            Action::Allow => SECCOMP_RET_ALLOW,
            Action::Errno(errno) => SECCOMP_RET_ERRNO | (errno as u32 & SECCOMP_RET_DATA),
            Action::KillProcess => SECCOMP_RET_KILL_PROCESS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CmpOp {
    Equal { value: u64 },
    NotEqual { value: u64 },
    GreaterOrEqual { value: u64 },
    /// `(arg & mask) == value`
    MaskedEqual { mask: u64, value: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArgumentPredicate {
    pub index: u8,
    #[serde(flatten)]
    pub op: CmpOp,
}

impl ArgumentPredicate {
    pub const fn equal(index: u8, value: u64) -> Self {
        Self { index, op: CmpOp::Equal { value } }
    }

    pub const fn not_equal(index: u8, value: u64) -> Self {
        Self { index, op: CmpOp::NotEqual { value } }
    }

    pub const fn greater_or_equal(index: u8, value: u64) -> Self {
        Self { index, op: CmpOp::GreaterOrEqual { value } }
    }

    pub const fn masked_equal(index: u8, mask: u64, value: u64) -> Self {
        Self { index, op: CmpOp::MaskedEqual { mask, value } }
    }

    /// Structural check done before any rule is added.
    pub fn is_well_formed(&self) -> bool {
        if self.index > MAX_ARG_INDEX {
            return false;
        }
        match self.op {
            CmpOp::MaskedEqual { mask, value } => value & !mask == 0,
            _ => true,
        }
    }

    /// Evaluate against a concrete argument vector.
    pub fn matches(&self, args: &[u64; 6]) -> bool {
        let arg = args[usize::from(self.index.min(MAX_ARG_INDEX))];
        match self.op {
            CmpOp::Equal { value } => arg == value,
            CmpOp::NotEqual { value } => arg != value,
            CmpOp::GreaterOrEqual { value } => arg >= value,
            CmpOp::MaskedEqual { mask, value } => arg & mask == value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyscallRule {
    pub syscall: Syscall,
    pub denial: DenialKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<ArgumentPredicate>,
}

impl SyscallRule {
    pub const fn deny(syscall: Syscall, denial: DenialKind) -> Self {
        Self { syscall, denial, predicate: None }
    }

    pub const fn deny_if(syscall: Syscall, denial: DenialKind, predicate: ArgumentPredicate) -> Self {
        Self { syscall, denial, predicate: Some(predicate) }
    }
}

/// Flags a group needs set, and flags that must be clear, to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gate {
    pub required: PolicyFlags,
    pub forbidden: PolicyFlags,
}

impl Gate {
    pub const ALWAYS: Gate = Gate::requires(PolicyFlags::empty());

    pub const fn requires(required: PolicyFlags) -> Self {
        Self { required, forbidden: PolicyFlags::empty() }
    }

    pub const fn unless(self, forbidden: PolicyFlags) -> Self {
        Self { required: self.required, forbidden }
    }

    pub fn is_open(&self, flags: PolicyFlags) -> bool {
        flags.contains(self.required) && !flags.intersects(self.forbidden)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RuleGroup {
    pub name: &'static str,
    pub gate: Gate,
    pub rules: &'static [SyscallRule],
}
