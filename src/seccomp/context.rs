//! In-progress filter: architectures plus rules, sealed into BPF.
//!
//! Generated layout:
//!
//! ```text
//!   ld  [arch]
//!   jeq ARCH_0, 0, 1 ; ja block_0      (one pair per architecture)
//!   ...
//!   ret KILL_PROCESS                   (foreign architecture)
//! block_N:
//!   ld  [nr]
//!   jeq NR, 1, 0 ; ja +len(body)       (one per filtered syscall, sorted by nr)
//!   body: conditional rules, then ret <unconditional action or default>
//!   ...
//!   ret DEFAULT
//! ```

use nix::errno::Errno;
use tracing::debug;

use super::arch::{Arch, X32_SYSCALL_BIT};
use super::bpf::{
    arg_hi, arg_lo, bpf_jump, bpf_stmt, jump_always, load_word, ret, SockFilter, BPF_ALU, BPF_AND,
    BPF_JEQ, BPF_JGE, BPF_JGT, BPF_JMP, BPF_K, OFFSET_ARCH, OFFSET_NR, SECCOMP_RET_KILL_PROCESS,
};
use super::program::FilterProgram;
use super::rule::{Action, ArgumentPredicate, CmpOp};
use super::syscalls::Syscall;

#[derive(Debug, Clone, Copy)]
struct ContextRule {
    syscall: Syscall,
    predicate: Option<ArgumentPredicate>,
    action: Action,
    /// Only materialised where the syscall is directly dispatched.
    exact: bool,
}

#[derive(Debug)]
pub struct FilterContext {
    default: Action,
    arches: Vec<Arch>,
    rules: Vec<ContextRule>,
}

impl FilterContext {
    /// A context holding the build architecture and no rules.
    pub fn new(default: Action) -> Result<Self, Errno> {
        let native = Arch::native().ok_or(Errno::EOPNOTSUPP)?;
        Ok(Self::with_arch(default, native))
    }

    /// A context for an arbitrary base architecture, for exporting
    /// filters that run elsewhere.
    pub fn with_arch(default: Action, base: Arch) -> Self {
        Self {
            default,
            arches: vec![base],
            rules: Vec::new(),
        }
    }

    /// `EEXIST` if already present, `EINVAL` for tokens the generator
    /// does not know.
    pub fn add_arch(&mut self, token: u32) -> Result<(), Errno> {
        let arch = Arch::from_token(token).ok_or(Errno::EINVAL)?;
        if self.arches.contains(&arch) {
            return Err(Errno::EEXIST);
        }
        self.arches.push(arch);
        Ok(())
    }

    pub fn add_rule(
        &mut self,
        action: Action,
        syscall: Syscall,
        predicate: Option<ArgumentPredicate>,
    ) -> Result<(), Errno> {
        self.push_rule(ContextRule {
            syscall,
            predicate,
            action,
            exact: false,
        })
    }

    /// Like [`add_rule`](Self::add_rule) but refuses to rewrite the rule
    /// for multiplexed entry points; architectures where the syscall is
    /// not directly dispatched get no rule at all.
    pub fn add_rule_exact(
        &mut self,
        action: Action,
        syscall: Syscall,
        predicate: Option<ArgumentPredicate>,
    ) -> Result<(), Errno> {
        let honoured = self
            .arches
            .iter()
            .any(|&arch| syscall.nr(arch).is_some() && !syscall.is_multiplexed(arch));
        if !honoured {
            return Err(Errno::EOPNOTSUPP);
        }
        self.push_rule(ContextRule {
            syscall,
            predicate,
            action,
            exact: true,
        })
    }

    fn push_rule(&mut self, rule: ContextRule) -> Result<(), Errno> {
        if let Some(pred) = rule.predicate {
            if !pred.is_well_formed() {
                return Err(Errno::EFAULT);
            }
        }
        if rule.action == self.default {
            return Err(Errno::EACCES);
        }
        let existing = self
            .rules
            .iter()
            .find(|other| other.syscall == rule.syscall && other.predicate == rule.predicate);
        if let Some(other) = existing {
            return if other.action == rule.action {
                Ok(())
            } else {
                Err(Errno::EEXIST)
            };
        }
        if self.arches.iter().all(|&arch| rule.syscall.nr(arch).is_none()) {
            debug!(syscall = %rule.syscall, "syscall absent on every filtered architecture");
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn seal(self) -> FilterProgram {
        let blocks: Vec<Vec<SockFilter>> = self.arches.iter().map(|&arch| self.arch_block(arch)).collect();

        let header_len = 1 + 2 * blocks.len() + 1;
        let total = header_len + blocks.iter().map(Vec::len).sum::<usize>();
        let mut insns = Vec::with_capacity(total);

        insns.push(load_word(OFFSET_ARCH));
        let mut block_start = header_len;
        for (i, (arch, block)) in self.arches.iter().zip(&blocks).enumerate() {
            let ja_pc = 1 + 2 * i + 1;
            insns.push(bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, arch.token(), 0, 1));
            insns.push(jump_always(offset(ja_pc, block_start)));
            block_start += block.len();
        }
        insns.push(ret(SECCOMP_RET_KILL_PROCESS));

        for block in blocks {
            insns.extend(block);
        }
        FilterProgram::new(insns)
    }

    fn arch_block(&self, arch: Arch) -> Vec<SockFilter> {
        let mut by_nr: Vec<(u32, Vec<&ContextRule>)> = Vec::new();
        for rule in &self.rules {
            let Some(nr) = rule.syscall.nr(arch) else {
                continue;
            };
            if rule.exact && rule.syscall.is_multiplexed(arch) {
                continue;
            }
            match by_nr.iter_mut().find(|(n, _)| *n == nr) {
                Some((_, rules)) => rules.push(rule),
                None => by_nr.push((nr, vec![rule])),
            }
        }
        by_nr.sort_by_key(|(nr, _)| *nr);

        let mut block = vec![load_word(OFFSET_NR)];
        if arch == Arch::X86_64 {
            // x32 ABI shares the audit arch token
            block.push(bpf_jump(BPF_JMP | BPF_JGE | BPF_K, X32_SYSCALL_BIT, 0, 1));
            block.push(ret(SECCOMP_RET_KILL_PROCESS));
        }
        for (nr, rules) in by_nr {
            let body = self.syscall_body(&rules);
            block.push(bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, nr, 1, 0));
            block.push(jump_always(body.len() as u32));
            block.extend(body);
        }
        block.push(ret(self.default.to_ret()));
        block
    }

    fn syscall_body(&self, rules: &[&ContextRule]) -> Vec<SockFilter> {
        let mut body = Vec::new();
        let mut fallback = self.default;
        for rule in rules {
            match rule.predicate {
                Some(pred) => emit_compare(&mut body, pred, rule.action.to_ret()),
                None => fallback = rule.action,
            }
        }
        body.push(ret(fallback.to_ret()));
        body
    }
}

/// `ja` displacement from the instruction at `from` to `to`.
fn offset(from: usize, to: usize) -> u32 {
    (to - from - 1) as u32
}

/// Emit a 64-bit argument comparison that returns `action` on match and
/// falls through to the next instruction otherwise.
fn emit_compare(out: &mut Vec<SockFilter>, pred: ArgumentPredicate, action: u32) {
    let lo = arg_lo(pred.index);
    let hi = arg_hi(pred.index);
    let split = |v: u64| ((v >> 32) as u32, v as u32);
    let jeq = |k, jt, jf| bpf_jump(BPF_JMP | BPF_JEQ | BPF_K, k, jt, jf);

    match pred.op {
        CmpOp::Equal { value } => {
            let (vh, vl) = split(value);
            out.extend([load_word(hi), jeq(vh, 0, 3), load_word(lo), jeq(vl, 0, 1), ret(action)]);
        }
        CmpOp::NotEqual { value } => {
            let (vh, vl) = split(value);
            out.extend([load_word(hi), jeq(vh, 0, 2), load_word(lo), jeq(vl, 1, 0), ret(action)]);
        }
        CmpOp::GreaterOrEqual { value } => {
            let (vh, vl) = split(value);
            out.extend([
                load_word(hi),
                bpf_jump(BPF_JMP | BPF_JGT | BPF_K, vh, 3, 0),
                jeq(vh, 0, 3),
                load_word(lo),
                bpf_jump(BPF_JMP | BPF_JGE | BPF_K, vl, 0, 1),
                ret(action),
            ]);
        }
        CmpOp::MaskedEqual { mask, value } => {
            let (mh, ml) = split(mask);
            let (vh, vl) = split(value);
            let and = |k| bpf_stmt(BPF_ALU | BPF_AND | BPF_K, k);
            if mh != 0 {
                out.extend([load_word(hi), and(mh), jeq(vh, 0, 4)]);
            }
            out.extend([load_word(lo), and(ml), jeq(vl, 0, 1), ret(action)]);
        }
    }
}
