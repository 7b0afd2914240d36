//! Classic BPF interpreter for the instruction subset the generator emits.
//!
//! Lets filters be checked without installing them.

use thiserror::Error;

use super::arch::Arch;
use super::bpf::{
    SockFilter, BPF_ABS, BPF_ALU, BPF_AND, BPF_JA, BPF_JEQ, BPF_JGE, BPF_JGT, BPF_JMP, BPF_JSET,
    BPF_K, BPF_LD, BPF_RET, BPF_W, SECCOMP_DATA_LEN, SECCOMP_RET_ACTION_FULL, SECCOMP_RET_ALLOW,
    SECCOMP_RET_DATA, SECCOMP_RET_ERRNO, SECCOMP_RET_KILL_PROCESS,
};
use super::program::FilterProgram;
use super::syscalls::Syscall;

/// Userspace mirror of `struct seccomp_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeccompData {
    pub nr: u32,
    pub arch: u32,
    pub instruction_pointer: u64,
    pub args: [u64; 6],
}

impl SeccompData {
    pub fn new(arch: u32, nr: u32) -> Self {
        Self {
            nr,
            arch,
            ..Self::default()
        }
    }

    /// `None` if `arch` has no such syscall.
    pub fn for_syscall(arch: Arch, syscall: Syscall) -> Option<Self> {
        syscall.nr(arch).map(|nr| Self::new(arch.token(), nr))
    }

    pub fn with_args(mut self, args: [u64; 6]) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, index: usize, value: u64) -> Self {
        if let Some(slot) = self.args.get_mut(index) {
            *slot = value;
        }
        self
    }

    /// Kernel layout, native byte order.
    pub fn to_bytes(&self) -> [u8; SECCOMP_DATA_LEN] {
        let mut out = [0u8; SECCOMP_DATA_LEN];
        out[0..4].copy_from_slice(&self.nr.to_ne_bytes());
        out[4..8].copy_from_slice(&self.arch.to_ne_bytes());
        out[8..16].copy_from_slice(&self.instruction_pointer.to_ne_bytes());
        for (i, arg) in self.args.iter().enumerate() {
            let start = 16 + 8 * i;
            out[start..start + 8].copy_from_slice(&arg.to_ne_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Errno(u16),
    KillProcess,
    /// Any other return value, verbatim.
    Other(u32),
}

impl Verdict {
    pub fn from_ret(k: u32) -> Self {
        match k & SECCOMP_RET_ACTION_FULL {
            SECCOMP_RET_ALLOW => Verdict::Allow,
            SECCOMP_RET_ERRNO => Verdict::Errno((k & SECCOMP_RET_DATA) as u16),
            SECCOMP_RET_KILL_PROCESS => Verdict::KillProcess,
            _ => Verdict::Other(k),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulateError {
    #[error("jump at {pc} leaves the program")]
    JumpOutOfRange { pc: usize },
    #[error("load at {pc} reads offset {offset} outside seccomp_data")]
    LoadOutOfRange { pc: usize, offset: u32 },
    #[error("unsupported opcode {code:#06x} at {pc}")]
    Unsupported { pc: usize, code: u16 },
    #[error("execution ran past the last instruction")]
    NoReturn,
}

/// Run `program` against one syscall invocation.
pub fn simulate(program: &FilterProgram, data: &SeccompData) -> Result<Verdict, SimulateError> {
    run(program.instructions(), &data.to_bytes()).map(Verdict::from_ret)
}

fn run(insns: &[SockFilter], data: &[u8; SECCOMP_DATA_LEN]) -> Result<u32, SimulateError> {
    let mut acc: u32 = 0;
    let mut pc = 0usize;

    while let Some(insn) = insns.get(pc) {
        let next = pc + 1;
        match insn.code {
            c if c == BPF_LD | BPF_W | BPF_ABS => {
                let offset = insn.k as usize;
                let in_range = offset.checked_add(4).is_some_and(|end| end <= SECCOMP_DATA_LEN);
                if offset % 4 != 0 || !in_range {
                    return Err(SimulateError::LoadOutOfRange { pc, offset: insn.k });
                }
                acc = u32::from_ne_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
                pc = next;
            }
            c if c == BPF_ALU | BPF_AND | BPF_K => {
                acc &= insn.k;
                pc = next;
            }
            c if c == BPF_JMP | BPF_JA => {
                pc = target(pc, next, insn.k as usize, insns.len())?;
            }
            c if c & 0x07 == BPF_JMP && c & 0x08 == BPF_K => {
                let taken = match c & 0xf0 {
                    BPF_JEQ => acc == insn.k,
                    BPF_JGT => acc > insn.k,
                    BPF_JGE => acc >= insn.k,
                    BPF_JSET => acc & insn.k != 0,
                    _ => return Err(SimulateError::Unsupported { pc, code: c }),
                };
                let skip = if taken { insn.jt } else { insn.jf };
                pc = target(pc, next, usize::from(skip), insns.len())?;
            }
            c if c == BPF_RET | BPF_K => return Ok(insn.k),
            code => return Err(SimulateError::Unsupported { pc, code }),
        }
    }
    Err(SimulateError::NoReturn)
}

fn target(pc: usize, next: usize, skip: usize, len: usize) -> Result<usize, SimulateError> {
    match next.checked_add(skip) {
        Some(to) if to < len => Ok(to),
        _ => Err(SimulateError::JumpOutOfRange { pc }),
    }
}
