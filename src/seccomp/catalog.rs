//! The fixed rule catalog.
//!
//! Groups never share a (syscall, predicate) pair, so the order they are
//! applied in does not change the resulting filter.

use super::arch::{PER_LINUX, PER_LINUX32};
use super::flags::PolicyFlags;
use super::rule::{ArgumentPredicate, Gate, RuleGroup, SyscallRule};
use super::syscalls::Syscall;

use super::rule::DenialKind::{NotImplemented as NOSYS, PermissionDenied as PERM};

pub const CLONE_NEWUSER: u64 = 0x1000_0000;
pub const TIOCSTI: u64 = 0x5412;
pub const TIOCLINUX: u64 = 0x541c;

const fn deny(syscall: Syscall) -> SyscallRule {
    SyscallRule::deny(syscall, PERM)
}

const fn nosys(syscall: Syscall) -> SyscallRule {
    SyscallRule::deny(syscall, NOSYS)
}

const BASELINE: &[SyscallRule] = &[
    // dmesg
    deny(Syscall::Syslog),
    deny(Syscall::Uselib),
    deny(Syscall::Acct),
    deny(Syscall::Quotactl),
    // kernel keyring
    deny(Syscall::AddKey),
    deny(Syscall::Keyctl),
    deny(Syscall::RequestKey),
    // VM/NUMA
    deny(Syscall::MovePages),
    deny(Syscall::Mbind),
    deny(Syscall::GetMempolicy),
    deny(Syscall::SetMempolicy),
    deny(Syscall::MigratePages),
];

const NAMESPACE: &[SyscallRule] = &[
    deny(Syscall::Unshare),
    deny(Syscall::Setns),
    deny(Syscall::Mount),
    deny(Syscall::Umount),
    deny(Syscall::Umount2),
    deny(Syscall::PivotRoot),
    deny(Syscall::Chroot),
    // flags are the first argument on every supported architecture
    SyscallRule::deny_if(
        Syscall::Clone,
        PERM,
        ArgumentPredicate::masked_equal(0, CLONE_NEWUSER, CLONE_NEWUSER),
    ),
    // clone_args lives in user memory and cannot be inspected; ENOSYS
    // makes libc fall back to clone.
    nosys(Syscall::Clone3),
    // new mount API
    nosys(Syscall::OpenTree),
    nosys(Syscall::MoveMount),
    nosys(Syscall::Fsopen),
    nosys(Syscall::Fsconfig),
    nosys(Syscall::Fsmount),
    nosys(Syscall::Fspick),
    nosys(Syscall::MountSetattr),
];

const TTY: &[SyscallRule] = &[
    // faking input to the controlling tty
    SyscallRule::deny_if(
        Syscall::Ioctl,
        PERM,
        ArgumentPredicate::masked_equal(1, 0xffff_ffff, TIOCSTI),
    ),
    // virtual console copy/paste
    SyscallRule::deny_if(
        Syscall::Ioctl,
        PERM,
        ArgumentPredicate::masked_equal(1, 0xffff_ffff, TIOCLINUX),
    ),
];

const fn devel(allowed_personality: u64) -> [SyscallRule; 3] {
    [
        deny(Syscall::PerfEventOpen),
        SyscallRule::deny_if(
            Syscall::Personality,
            PERM,
            ArgumentPredicate::not_equal(0, allowed_personality),
        ),
        deny(Syscall::Ptrace),
    ]
}

const DEVEL: &[SyscallRule] = &devel(PER_LINUX);
const DEVEL_LINUX32: &[SyscallRule] = &devel(PER_LINUX32);

const EMULATION: &[SyscallRule] = &[deny(Syscall::ModifyLdt)];

const COMMON_EXT: &[SyscallRule] = &[
    // system clock
    deny(Syscall::Adjtimex),
    deny(Syscall::ClockAdjtime),
    deny(Syscall::ClockAdjtime64),
    deny(Syscall::ClockSettime),
    deny(Syscall::ClockSettime64),
    deny(Syscall::Settimeofday),
    // kernel modules
    deny(Syscall::DeleteModule),
    deny(Syscall::FinitModule),
    deny(Syscall::InitModule),
    // reboot
    deny(Syscall::KexecFileLoad),
    deny(Syscall::KexecLoad),
    deny(Syscall::Reboot),
    // swap
    deny(Syscall::Swapoff),
    deny(Syscall::Swapon),
];

const NAMESPACE_EXT: &[SyscallRule] = &[
    // ownership
    deny(Syscall::Chown),
    deny(Syscall::Chown32),
    deny(Syscall::Fchown),
    deny(Syscall::Fchown32),
    deny(Syscall::Fchownat),
    deny(Syscall::Lchown),
    deny(Syscall::Lchown32),
    // credentials
    deny(Syscall::Setgid),
    deny(Syscall::Setgid32),
    deny(Syscall::Setgroups),
    deny(Syscall::Setgroups32),
    deny(Syscall::Setregid),
    deny(Syscall::Setregid32),
    deny(Syscall::Setresgid),
    deny(Syscall::Setresgid32),
    deny(Syscall::Setresuid),
    deny(Syscall::Setresuid32),
    deny(Syscall::Setreuid),
    deny(Syscall::Setreuid32),
    deny(Syscall::Setuid),
    deny(Syscall::Setuid32),
];

const EMULATION_EXT: &[SyscallRule] = &[
    nosys(Syscall::SubpageProt),
    nosys(Syscall::SwitchEndian),
    nosys(Syscall::Vm86),
    nosys(Syscall::Vm86old),
];

/// Every rule group in application order.
pub const GROUPS: &[RuleGroup] = &[
    RuleGroup {
        name: "baseline",
        gate: Gate::ALWAYS,
        rules: BASELINE,
    },
    RuleGroup {
        name: "namespace",
        gate: Gate::requires(PolicyFlags::DENY_NAMESPACE),
        rules: NAMESPACE,
    },
    RuleGroup {
        name: "tty",
        gate: Gate::requires(PolicyFlags::DENY_TTY),
        rules: TTY,
    },
    RuleGroup {
        name: "devel",
        gate: Gate::requires(PolicyFlags::DENY_DEVEL).unless(PolicyFlags::LINUX32),
        rules: DEVEL,
    },
    RuleGroup {
        name: "devel-linux32",
        gate: Gate::requires(PolicyFlags::DENY_DEVEL.union(PolicyFlags::LINUX32)),
        rules: DEVEL_LINUX32,
    },
    RuleGroup {
        name: "emulation",
        gate: Gate::ALWAYS.unless(PolicyFlags::ALLOW_SECONDARY_ARCH),
        rules: EMULATION,
    },
    RuleGroup {
        name: "common-ext",
        gate: Gate::requires(PolicyFlags::EXTENDED),
        rules: COMMON_EXT,
    },
    RuleGroup {
        name: "namespace-ext",
        gate: Gate::requires(PolicyFlags::DENY_NAMESPACE.union(PolicyFlags::EXTENDED)),
        rules: NAMESPACE_EXT,
    },
    RuleGroup {
        name: "emulation-ext",
        gate: Gate::requires(PolicyFlags::EXTENDED).unless(PolicyFlags::ALLOW_SECONDARY_ARCH),
        rules: EMULATION_EXT,
    },
];

/// Groups whose gate is open under `flags`, in application order.
pub fn selected_groups(flags: PolicyFlags) -> impl Iterator<Item = &'static RuleGroup> {
    GROUPS.iter().filter(move |group| group.gate.is_open(flags))
}
