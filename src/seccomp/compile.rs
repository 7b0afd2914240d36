//! Policy flags in, sealed filter out.

use nix::errno::Errno;
use tracing::{debug, info};

use super::arch::ArchitectureSpec;
use super::catalog::GROUPS;
use super::context::FilterContext;
use super::error::CompileError;
use super::family::{family_denials, SOCKET_FAMILY_ALLOWLIST};
use super::flags::PolicyFlags;
use super::program::{FilterProgram, Sink, SinkError};
use super::rule::{Action, RuleGroup};
use super::syscalls::Syscall;

/// Compile the policy selected by `flags` and hand it to `sink`.
///
/// `Sink::Load` confines the calling process for the rest of its life.
pub fn compile(arch: ArchitectureSpec, flags: PolicyFlags, sink: Sink<'_>) -> Result<(), CompileError> {
    compile_rules(arch, GROUPS, flags, sink)
}

/// Like [`compile`], with `groups` in place of the built-in catalog.
///
/// Groups whose gate is closed under `flags` are skipped. Architecture
/// setup and the socket family gate still follow `flags`.
pub fn compile_rules(
    arch: ArchitectureSpec,
    groups: &[RuleGroup],
    flags: PolicyFlags,
    sink: Sink<'_>,
) -> Result<(), CompileError> {
    let program = build_rules(arch, groups, flags)?;
    program.dispatch(sink).map_err(|err| match err {
        SinkError::Export(err) => CompileError::Export(err),
        SinkError::Load(errno) => CompileError::Load(errno),
    })?;
    debug!(instructions = program.len(), "filter dispatched");
    Ok(())
}

/// Compile to bytecode in memory.
pub fn export(arch: ArchitectureSpec, flags: PolicyFlags) -> Result<Vec<u8>, CompileError> {
    let mut out = Vec::new();
    compile(arch, flags, Sink::Export(&mut out))?;
    Ok(out)
}

/// Compile without dispatching.
pub fn build(arch: ArchitectureSpec, flags: PolicyFlags) -> Result<FilterProgram, CompileError> {
    build_rules(arch, GROUPS, flags)
}

/// Build from caller-supplied groups without dispatching.
pub fn build_rules(
    arch: ArchitectureSpec,
    groups: &[RuleGroup],
    flags: PolicyFlags,
) -> Result<FilterProgram, CompileError> {
    let mut ctx = FilterContext::new(Action::Allow).map_err(CompileError::ContextInit)?;

    add_architectures(&mut ctx, arch, flags)?;

    for group in groups.iter().filter(|group| group.gate.is_open(flags)) {
        apply_group(&mut ctx, group, flags)?;
    }

    apply_socket_gate(&mut ctx, flags);

    Ok(ctx.seal())
}

fn add_architectures(ctx: &mut FilterContext, arch: ArchitectureSpec, flags: PolicyFlags) -> Result<(), CompileError> {
    // Single-arch systems are covered by the native architecture alone.
    if arch.primary == 0 {
        return Ok(());
    }

    // The native architecture stays in the filter regardless; the
    // launching process still has to run after the filter is loaded.
    match ctx.add_arch(arch.primary) {
        Ok(()) | Err(Errno::EEXIST) => {}
        Err(errno) => {
            return Err(CompileError::PrimaryArch {
                arch: arch.primary,
                errno,
            })
        }
    }

    if !flags.contains(PolicyFlags::ALLOW_SECONDARY_ARCH) {
        return Ok(());
    }
    match arch.secondary {
        Some(secondary) if secondary != 0 => match ctx.add_arch(secondary) {
            Ok(()) | Err(Errno::EEXIST) => Ok(()),
            Err(errno) => Err(CompileError::SecondaryArch {
                arch: secondary,
                errno,
            }),
        },
        _ => Ok(()),
    }
}

fn apply_group(ctx: &mut FilterContext, group: &RuleGroup, flags: PolicyFlags) -> Result<(), CompileError> {
    if flags.contains(PolicyFlags::VERBOSE) {
        info!(group = group.name, rules = group.rules.len(), "adding seccomp ruleset");
    } else {
        debug!(group = group.name, rules = group.rules.len(), "adding seccomp ruleset");
    }

    for rule in group.rules {
        ctx.add_rule(rule.denial.action(), rule.syscall, rule.predicate)
            .map_err(|errno| match errno {
                Errno::EFAULT => CompileError::MalformedPredicate {
                    group: group.name,
                    syscall: rule.syscall,
                    errno,
                },
                _ => CompileError::RuleAdd {
                    group: group.name,
                    syscall: rule.syscall,
                    errno,
                },
            })?;
    }
    Ok(())
}

/// Failures are logged and otherwise ignored; some architectures cannot
/// filter `socket` arguments at all.
fn apply_socket_gate(ctx: &mut FilterContext, flags: PolicyFlags) {
    let action = Action::Errno(libc::EAFNOSUPPORT as u16);
    for denial in family_denials(SOCKET_FAMILY_ALLOWLIST, flags) {
        if let Err(errno) = ctx.add_rule_exact(action, Syscall::Socket, Some(denial.predicate())) {
            debug!(?denial, %errno, "socket family rule not applied");
        }
    }
}
