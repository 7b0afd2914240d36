use std::io;

use nix::errno::Errno;
use thiserror::Error;

use super::syscalls::Syscall;

/// Why compilation stopped. Each variant has a stable numeric code shared
/// with whatever launched the compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot initialise filter context: {0}")]
    ContextInit(#[source] Errno),

    #[error("cannot add primary architecture {arch:#x}: {errno}")]
    PrimaryArch { arch: u32, errno: Errno },

    #[error("cannot add secondary architecture {arch:#x}: {errno}")]
    SecondaryArch { arch: u32, errno: Errno },

    #[error("malformed predicate on {syscall} in group {group}")]
    MalformedPredicate {
        group: &'static str,
        syscall: Syscall,
        errno: Errno,
    },

    #[error("cannot add rule for {syscall} in group {group}: {errno}")]
    RuleAdd {
        group: &'static str,
        syscall: Syscall,
        errno: Errno,
    },

    #[error("cannot export filter: {0}")]
    Export(#[source] io::Error),

    #[error("cannot load filter: {0}")]
    Load(#[source] Errno),
}

impl CompileError {
    pub fn code(&self) -> i32 {
        match self {
            CompileError::ContextInit(_) => 1,
            CompileError::PrimaryArch { .. } => 2,
            CompileError::SecondaryArch { .. } => 3,
            CompileError::MalformedPredicate { .. } => 4,
            CompileError::RuleAdd { .. } => 5,
            CompileError::Export(_) => 6,
            CompileError::Load(_) => 7,
        }
    }

    /// The underlying system error, when there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            CompileError::ContextInit(errno)
            | CompileError::PrimaryArch { errno, .. }
            | CompileError::SecondaryArch { errno, .. }
            | CompileError::MalformedPredicate { errno, .. }
            | CompileError::RuleAdd { errno, .. }
            | CompileError::Load(errno) => Some(*errno),
            CompileError::Export(err) => err.raw_os_error().map(Errno::from_raw),
        }
    }
}
