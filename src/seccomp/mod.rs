//! seccomp-bpf policy compiler.
//!
//! A default-allow filter assembled from deny rules (the built-in catalog
//! or caller-supplied groups), a socket address family allow-list and one
//! or two architectures.
//! Raw BPF generation, no libseccomp.

pub mod arch;
pub mod bpf;
pub mod catalog;
mod compile;
pub mod context;
mod error;
pub mod family;
mod flags;
pub mod program;
pub mod rule;
pub mod sim;
pub mod syscalls;

pub use arch::{Arch, ArchitectureSpec};
pub use compile::{build, build_rules, compile, compile_rules, export};
pub use context::FilterContext;
pub use error::CompileError;
pub use flags::PolicyFlags;
pub use program::{FilterProgram, ProgramError, Sink};
pub use rule::{Action, ArgumentPredicate, CmpOp, DenialKind, RuleGroup, SyscallRule};
pub use sim::{simulate, SeccompData, SimulateError, Verdict};
pub use syscalls::Syscall;
