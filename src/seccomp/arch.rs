//! Architecture tokens understood by the filter generator.
//!
//! Tokens are the kernel `AUDIT_ARCH_*` values reported in
//! `seccomp_data.arch`, which are also what libseccomp calls `SCMP_ARCH_*`.

use std::fmt;

pub const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
pub const AUDIT_ARCH_I386: u32 = 0x4000_0003;
pub const AUDIT_ARCH_AARCH64: u32 = 0xc000_00b7;
pub const AUDIT_ARCH_ARM: u32 = 0x4000_0028;

/// x32 syscalls on x86_64 carry this bit in their number.
pub const X32_SYSCALL_BIT: u32 = 0x4000_0000;

// personality(2) execution domains
pub const PER_LINUX: u64 = 0x0000;
pub const PER_LINUX32: u64 = 0x0008;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    X86,
    Aarch64,
    Arm,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::X86_64, Arch::X86, Arch::Aarch64, Arch::Arm];

    pub const fn token(self) -> u32 {
        match self {
            Arch::X86_64 => AUDIT_ARCH_X86_64,
            Arch::X86 => AUDIT_ARCH_I386,
            Arch::Aarch64 => AUDIT_ARCH_AARCH64,
            Arch::Arm => AUDIT_ARCH_ARM,
        }
    }

    pub fn from_token(token: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|arch| arch.token() == token)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::X86 => "x86",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "arm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x86_64" | "amd64" => Some(Arch::X86_64),
            "x86" | "i386" | "i686" => Some(Arch::X86),
            "aarch64" | "arm64" => Some(Arch::Aarch64),
            "arm" => Some(Arch::Arm),
            _ => None,
        }
    }

    /// The architecture this crate was built for, if the generator knows it.
    pub const fn native() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Arch::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Arch::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Arch::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Arch::Arm)
        } else {
            None
        }
    }

    /// Compatibility architecture a native kernel can also execute.
    pub const fn secondary(self) -> Option<Self> {
        match self {
            Arch::X86_64 => Some(Arch::X86),
            Arch::Aarch64 => Some(Arch::Arm),
            Arch::X86 | Arch::Arm => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Architectures a filter must account for, as raw tokens.
///
/// A zero `primary` leaves the context with its native architecture only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchitectureSpec {
    pub primary: u32,
    pub secondary: Option<u32>,
}

impl ArchitectureSpec {
    pub const fn new(primary: u32, secondary: Option<u32>) -> Self {
        Self { primary, secondary }
    }

    /// The build architecture paired with its compatibility architecture.
    pub fn native() -> Self {
        match Arch::native() {
            Some(arch) => Self {
                primary: arch.token(),
                secondary: arch.secondary().map(Arch::token),
            },
            None => Self::default(),
        }
    }

    pub fn of(primary: Arch, secondary: Option<Arch>) -> Self {
        Self {
            primary: primary.token(),
            secondary: secondary.map(Arch::token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_lookup() {
        for arch in Arch::ALL {
            assert_eq!(Arch::from_token(arch.token()), Some(arch));
            assert_eq!(Arch::from_name(arch.name()), Some(arch));
        }
        assert_eq!(Arch::from_token(0), None);
    }

    #[test]
    fn native_spec_pairs_compat_architecture() {
        let spec = ArchitectureSpec::native();
        match Arch::native() {
            Some(Arch::X86_64) => assert_eq!(spec.secondary, Some(AUDIT_ARCH_I386)),
            Some(Arch::Aarch64) => assert_eq!(spec.secondary, Some(AUDIT_ARCH_ARM)),
            Some(_) => assert_eq!(spec.secondary, None),
            None => assert_eq!(spec.primary, 0),
        }
    }
}
