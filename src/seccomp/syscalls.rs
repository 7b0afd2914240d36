//! Syscall numbers for every syscall the policy catalog names.
//!
//! Per-architecture numbers from asm/unistd_64.h (x86_64), asm/unistd_32.h
//! (i386), asm-generic/unistd.h (aarch64) and arch/arm/tools/syscall.tbl
//! (EABI). `-` marks a syscall the architecture does not have.

use std::fmt;

use serde::{Serialize, Serializer};

use super::arch::Arch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Syscall {
    Syslog,
    Uselib,
    Acct,
    Quotactl,
    AddKey,
    Keyctl,
    RequestKey,
    MovePages,
    Mbind,
    GetMempolicy,
    SetMempolicy,
    MigratePages,
    Adjtimex,
    ClockAdjtime,
    ClockAdjtime64,
    ClockSettime,
    ClockSettime64,
    Settimeofday,
    DeleteModule,
    FinitModule,
    InitModule,
    KexecFileLoad,
    KexecLoad,
    Reboot,
    Swapoff,
    Swapon,
    Unshare,
    Setns,
    Mount,
    Umount,
    Umount2,
    PivotRoot,
    Chroot,
    Clone,
    Clone3,
    OpenTree,
    MoveMount,
    Fsopen,
    Fsconfig,
    Fsmount,
    Fspick,
    MountSetattr,
    Chown,
    Chown32,
    Fchown,
    Fchown32,
    Fchownat,
    Lchown,
    Lchown32,
    Setgid,
    Setgid32,
    Setgroups,
    Setgroups32,
    Setregid,
    Setregid32,
    Setresgid,
    Setresgid32,
    Setresuid,
    Setresuid32,
    Setreuid,
    Setreuid32,
    Setuid,
    Setuid32,
    Ioctl,
    PerfEventOpen,
    Personality,
    Ptrace,
    ModifyLdt,
    SubpageProt,
    SwitchEndian,
    Vm86,
    Vm86old,
    Socket,
}

const NONE: i32 = -1;

struct Entry {
    syscall: Syscall,
    name: &'static str,
    x86_64: i32,
    x86: i32,
    aarch64: i32,
    arm: i32,
}

const fn e(syscall: Syscall, name: &'static str, x86_64: i32, x86: i32, aarch64: i32, arm: i32) -> Entry {
    Entry { syscall, name, x86_64, x86, aarch64, arm }
}

/// Indexed by `Syscall` discriminant.
#[rustfmt::skip]
const TABLE: &[Entry] = &[
    //                                               x86_64  i386  aarch64  arm
    e(Syscall::Syslog,         "syslog",             103,    103,  116,     103),
    e(Syscall::Uselib,         "uselib",             134,    86,   NONE,    86),
    e(Syscall::Acct,           "acct",               163,    51,   89,      51),
    e(Syscall::Quotactl,       "quotactl",           179,    131,  60,      131),
    e(Syscall::AddKey,         "add_key",            248,    286,  217,     309),
    e(Syscall::Keyctl,         "keyctl",             250,    288,  219,     311),
    e(Syscall::RequestKey,     "request_key",        249,    287,  218,     310),
    e(Syscall::MovePages,      "move_pages",         279,    317,  239,     344),
    e(Syscall::Mbind,          "mbind",              237,    274,  235,     319),
    e(Syscall::GetMempolicy,   "get_mempolicy",      239,    275,  236,     320),
    e(Syscall::SetMempolicy,   "set_mempolicy",      238,    276,  237,     321),
    e(Syscall::MigratePages,   "migrate_pages",      256,    294,  238,     400),
    e(Syscall::Adjtimex,       "adjtimex",           159,    124,  171,     124),
    e(Syscall::ClockAdjtime,   "clock_adjtime",      305,    343,  266,     372),
    e(Syscall::ClockAdjtime64, "clock_adjtime64",    NONE,   405,  NONE,    405),
    e(Syscall::ClockSettime,   "clock_settime",      227,    264,  112,     262),
    e(Syscall::ClockSettime64, "clock_settime64",    NONE,   404,  NONE,    404),
    e(Syscall::Settimeofday,   "settimeofday",       164,    79,   170,     79),
    e(Syscall::DeleteModule,   "delete_module",      176,    129,  106,     129),
    e(Syscall::FinitModule,    "finit_module",       313,    350,  273,     379),
    e(Syscall::InitModule,     "init_module",        175,    128,  105,     128),
    e(Syscall::KexecFileLoad,  "kexec_file_load",    320,    NONE, 294,     401),
    e(Syscall::KexecLoad,      "kexec_load",         246,    283,  104,     347),
    e(Syscall::Reboot,         "reboot",             169,    88,   142,     88),
    e(Syscall::Swapoff,        "swapoff",            168,    115,  225,     115),
    e(Syscall::Swapon,         "swapon",             167,    87,   224,     87),
    e(Syscall::Unshare,        "unshare",            272,    310,  97,      337),
    e(Syscall::Setns,          "setns",              308,    346,  268,     375),
    e(Syscall::Mount,          "mount",              165,    21,   40,      21),
    e(Syscall::Umount,         "umount",             NONE,   22,   NONE,    NONE),
    e(Syscall::Umount2,        "umount2",            166,    52,   39,      52),
    e(Syscall::PivotRoot,      "pivot_root",         155,    217,  41,      218),
    e(Syscall::Chroot,         "chroot",             161,    61,   51,      61),
    e(Syscall::Clone,          "clone",              56,     120,  220,     120),
    e(Syscall::Clone3,         "clone3",             435,    435,  435,     435),
    e(Syscall::OpenTree,       "open_tree",          428,    428,  428,     428),
    e(Syscall::MoveMount,      "move_mount",         429,    429,  429,     429),
    e(Syscall::Fsopen,         "fsopen",             430,    430,  430,     430),
    e(Syscall::Fsconfig,       "fsconfig",           431,    431,  431,     431),
    e(Syscall::Fsmount,        "fsmount",            432,    432,  432,     432),
    e(Syscall::Fspick,         "fspick",             433,    433,  433,     433),
    e(Syscall::MountSetattr,   "mount_setattr",      442,    442,  442,     442),
    e(Syscall::Chown,          "chown",              92,     182,  NONE,    182),
    e(Syscall::Chown32,        "chown32",            NONE,   212,  NONE,    212),
    e(Syscall::Fchown,         "fchown",             93,     95,   55,      95),
    e(Syscall::Fchown32,       "fchown32",           NONE,   207,  NONE,    207),
    e(Syscall::Fchownat,       "fchownat",           260,    298,  54,      325),
    e(Syscall::Lchown,         "lchown",             94,     16,   NONE,    16),
    e(Syscall::Lchown32,       "lchown32",           NONE,   198,  NONE,    198),
    e(Syscall::Setgid,         "setgid",             106,    46,   144,     46),
    e(Syscall::Setgid32,       "setgid32",           NONE,   214,  NONE,    214),
    e(Syscall::Setgroups,      "setgroups",          116,    81,   159,     81),
    e(Syscall::Setgroups32,    "setgroups32",        NONE,   206,  NONE,    206),
    e(Syscall::Setregid,       "setregid",           114,    71,   143,     71),
    e(Syscall::Setregid32,     "setregid32",         NONE,   204,  NONE,    204),
    e(Syscall::Setresgid,      "setresgid",          119,    170,  149,     170),
    e(Syscall::Setresgid32,    "setresgid32",        NONE,   210,  NONE,    210),
    e(Syscall::Setresuid,      "setresuid",          117,    164,  147,     164),
    e(Syscall::Setresuid32,    "setresuid32",        NONE,   208,  NONE,    208),
    e(Syscall::Setreuid,       "setreuid",           113,    70,   145,     70),
    e(Syscall::Setreuid32,     "setreuid32",         NONE,   203,  NONE,    203),
    e(Syscall::Setuid,         "setuid",             105,    23,   146,     23),
    e(Syscall::Setuid32,       "setuid32",           NONE,   213,  NONE,    213),
    e(Syscall::Ioctl,          "ioctl",              16,     54,   29,      54),
    e(Syscall::PerfEventOpen,  "perf_event_open",    298,    336,  241,     364),
    e(Syscall::Personality,    "personality",        135,    136,  92,      136),
    e(Syscall::Ptrace,         "ptrace",             101,    26,   117,     26),
    e(Syscall::ModifyLdt,      "modify_ldt",         154,    123,  NONE,    NONE),
    e(Syscall::SubpageProt,    "subpage_prot",       NONE,   NONE, NONE,    NONE),
    e(Syscall::SwitchEndian,   "switch_endian",      NONE,   NONE, NONE,    NONE),
    e(Syscall::Vm86,           "vm86",               NONE,   166,  NONE,    NONE),
    e(Syscall::Vm86old,        "vm86old",            NONE,   113,  NONE,    NONE),
    e(Syscall::Socket,         "socket",             41,     359,  198,     281),
];

impl Syscall {
    fn entry(self) -> &'static Entry {
        &TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TABLE.iter().find(|entry| entry.name == name).map(|entry| entry.syscall)
    }

    pub fn all() -> impl Iterator<Item = Syscall> {
        TABLE.iter().map(|entry| entry.syscall)
    }

    /// Syscall number on `arch`, or `None` if the architecture lacks it.
    pub fn nr(self, arch: Arch) -> Option<u32> {
        let entry = self.entry();
        let nr = match arch {
            Arch::X86_64 => entry.x86_64,
            Arch::X86 => entry.x86,
            Arch::Aarch64 => entry.aarch64,
            Arch::Arm => entry.arm,
        };
        u32::try_from(nr).ok()
    }

    /// True where the call is also reachable through a multiplexer
    /// (`socketcall` on i386), so filtering its own number is not exact.
    pub fn is_multiplexed(self, arch: Arch) -> bool {
        matches!((self, arch), (Syscall::Socket, Arch::X86))
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Syscall {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (index, entry) in TABLE.iter().enumerate() {
            assert_eq!(entry.syscall as usize, index, "{} out of place", entry.name);
        }
        assert_eq!(TABLE.len(), Syscall::Socket as usize + 1);
    }

    #[test]
    fn numbers_are_unique_per_architecture() {
        for arch in Arch::ALL {
            let mut seen = std::collections::HashMap::new();
            for syscall in Syscall::all() {
                if let Some(nr) = syscall.nr(arch) {
                    if let Some(prev) = seen.insert(nr, syscall) {
                        panic!("{arch}: {prev} and {syscall} share number {nr}");
                    }
                }
            }
        }
    }

    #[test]
    fn names_resolve_back() {
        assert_eq!(Syscall::from_name("clone3"), Some(Syscall::Clone3));
        assert_eq!(Syscall::from_name("not_a_syscall"), None);
        for syscall in Syscall::all() {
            assert_eq!(Syscall::from_name(syscall.name()), Some(syscall));
        }
    }

    #[test]
    fn json_uses_syscall_names() {
        let json = serde_json::to_string(&Syscall::PivotRoot).unwrap();
        assert_eq!(json, "\"pivot_root\"");
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn x86_64_numbers_match_libc() {
        let expected: &[(Syscall, libc::c_long)] = &[
            (Syscall::Syslog, libc::SYS_syslog),
            (Syscall::Uselib, libc::SYS_uselib),
            (Syscall::Acct, libc::SYS_acct),
            (Syscall::Quotactl, libc::SYS_quotactl),
            (Syscall::AddKey, libc::SYS_add_key),
            (Syscall::Keyctl, libc::SYS_keyctl),
            (Syscall::RequestKey, libc::SYS_request_key),
            (Syscall::MovePages, libc::SYS_move_pages),
            (Syscall::Mbind, libc::SYS_mbind),
            (Syscall::GetMempolicy, libc::SYS_get_mempolicy),
            (Syscall::SetMempolicy, libc::SYS_set_mempolicy),
            (Syscall::MigratePages, libc::SYS_migrate_pages),
            (Syscall::Adjtimex, libc::SYS_adjtimex),
            (Syscall::ClockAdjtime, libc::SYS_clock_adjtime),
            (Syscall::ClockSettime, libc::SYS_clock_settime),
            (Syscall::Settimeofday, libc::SYS_settimeofday),
            (Syscall::DeleteModule, libc::SYS_delete_module),
            (Syscall::FinitModule, libc::SYS_finit_module),
            (Syscall::InitModule, libc::SYS_init_module),
            (Syscall::KexecFileLoad, libc::SYS_kexec_file_load),
            (Syscall::KexecLoad, libc::SYS_kexec_load),
            (Syscall::Reboot, libc::SYS_reboot),
            (Syscall::Swapoff, libc::SYS_swapoff),
            (Syscall::Swapon, libc::SYS_swapon),
            (Syscall::Unshare, libc::SYS_unshare),
            (Syscall::Setns, libc::SYS_setns),
            (Syscall::Mount, libc::SYS_mount),
            (Syscall::Umount2, libc::SYS_umount2),
            (Syscall::PivotRoot, libc::SYS_pivot_root),
            (Syscall::Chroot, libc::SYS_chroot),
            (Syscall::Clone, libc::SYS_clone),
            (Syscall::Clone3, libc::SYS_clone3),
            (Syscall::Chown, libc::SYS_chown),
            (Syscall::Fchown, libc::SYS_fchown),
            (Syscall::Fchownat, libc::SYS_fchownat),
            (Syscall::Lchown, libc::SYS_lchown),
            (Syscall::Setgid, libc::SYS_setgid),
            (Syscall::Setgroups, libc::SYS_setgroups),
            (Syscall::Setregid, libc::SYS_setregid),
            (Syscall::Setresgid, libc::SYS_setresgid),
            (Syscall::Setresuid, libc::SYS_setresuid),
            (Syscall::Setreuid, libc::SYS_setreuid),
            (Syscall::Setuid, libc::SYS_setuid),
            (Syscall::Ioctl, libc::SYS_ioctl),
            (Syscall::PerfEventOpen, libc::SYS_perf_event_open),
            (Syscall::Personality, libc::SYS_personality),
            (Syscall::Ptrace, libc::SYS_ptrace),
            (Syscall::ModifyLdt, libc::SYS_modify_ldt),
            (Syscall::Socket, libc::SYS_socket),
        ];
        for &(syscall, nr) in expected {
            assert_eq!(syscall.nr(Arch::X86_64), Some(nr as u32), "{syscall}");
        }
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn aarch64_numbers_match_libc() {
        let expected: &[(Syscall, libc::c_long)] = &[
            (Syscall::Syslog, libc::SYS_syslog),
            (Syscall::Acct, libc::SYS_acct),
            (Syscall::Keyctl, libc::SYS_keyctl),
            (Syscall::MigratePages, libc::SYS_migrate_pages),
            (Syscall::Unshare, libc::SYS_unshare),
            (Syscall::Setns, libc::SYS_setns),
            (Syscall::Mount, libc::SYS_mount),
            (Syscall::Umount2, libc::SYS_umount2),
            (Syscall::PivotRoot, libc::SYS_pivot_root),
            (Syscall::Clone, libc::SYS_clone),
            (Syscall::Fchownat, libc::SYS_fchownat),
            (Syscall::Setresgid, libc::SYS_setresgid),
            (Syscall::Setgroups, libc::SYS_setgroups),
            (Syscall::Ioctl, libc::SYS_ioctl),
            (Syscall::PerfEventOpen, libc::SYS_perf_event_open),
            (Syscall::Personality, libc::SYS_personality),
            (Syscall::Ptrace, libc::SYS_ptrace),
            (Syscall::Socket, libc::SYS_socket),
        ];
        for &(syscall, nr) in expected {
            assert_eq!(syscall.nr(Arch::Aarch64), Some(nr as u32), "{syscall}");
        }
    }
}
