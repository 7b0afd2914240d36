//! A sealed filter and the two ways to consume it.

use std::io::{self, Write};

use nix::errno::Errno;
use thiserror::Error;
use tracing::debug;

use super::bpf::{
    SockFilter, SockFprog, BPF_MAXINSNS, INSN_LEN, SECCOMP_FILTER_FLAG_TSYNC, SECCOMP_SET_MODE_FILTER,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("bytecode length {0} is not a multiple of {INSN_LEN}")]
    Truncated(usize),
    #[error("bytecode holds no instructions")]
    Empty,
    #[error("{0} instructions exceed the kernel limit of {BPF_MAXINSNS}")]
    TooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProgram {
    insns: Vec<SockFilter>,
}

/// Where a sealed program goes.
pub enum Sink<'a> {
    /// Activate in the calling thread group. Irreversible.
    Load,
    /// Serialize for another process to load.
    Export(&'a mut dyn Write),
}

impl FilterProgram {
    pub(crate) fn new(insns: Vec<SockFilter>) -> Self {
        Self { insns }
    }

    pub fn instructions(&self) -> &[SockFilter] {
        &self.insns
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.insns.iter().flat_map(|insn| insn.to_bytes()).collect()
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ProgramError> {
        if raw.len() % INSN_LEN != 0 {
            return Err(ProgramError::Truncated(raw.len()));
        }
        let insns: Vec<SockFilter> = raw
            .chunks_exact(INSN_LEN)
            .map(|chunk| {
                let mut insn = [0u8; INSN_LEN];
                insn.copy_from_slice(chunk);
                SockFilter::from_bytes(insn)
            })
            .collect();
        if insns.is_empty() {
            return Err(ProgramError::Empty);
        }
        if insns.len() > BPF_MAXINSNS {
            return Err(ProgramError::TooLong(insns.len()));
        }
        Ok(Self { insns })
    }

    fn check_len(&self) -> Result<u16, Errno> {
        if self.insns.is_empty() {
            return Err(Errno::EINVAL);
        }
        if self.insns.len() > BPF_MAXINSNS {
            return Err(Errno::E2BIG);
        }
        u16::try_from(self.insns.len()).map_err(|_| Errno::E2BIG)
    }

    /// Write the raw `sock_filter` array.
    pub fn export(&self, out: &mut dyn Write) -> io::Result<()> {
        self.check_len().map_err(io::Error::from)?;
        out.write_all(&self.to_bytes())?;
        out.flush()
    }

    /// Set `no_new_privs` and install the filter on every thread of the
    /// process. The `seccomp(2)` call itself is already subject to it.
    pub fn load(&self) -> Result<(), Errno> {
        let len = self.check_len()?;
        let prog = SockFprog {
            len,
            filter: self.insns.as_ptr(),
        };

        let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        Errno::result(ret)?;

        let ret = unsafe {
            libc::syscall(
                libc::SYS_seccomp,
                SECCOMP_SET_MODE_FILTER,
                SECCOMP_FILTER_FLAG_TSYNC,
                &prog as *const SockFprog,
            )
        };
        // TSYNC reports the tid of a thread it could not synchronise
        if ret > 0 {
            debug!(tid = ret, "thread refused filter synchronisation");
            return Err(Errno::ESRCH);
        }
        Errno::result(ret).map(drop)
    }

    /// Hand the program to `sink`.
    pub fn dispatch(&self, sink: Sink<'_>) -> Result<(), SinkError> {
        match sink {
            Sink::Load => self.load().map_err(SinkError::Load),
            Sink::Export(out) => self.export(out).map_err(SinkError::Export),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("export failed: {0}")]
    Export(#[source] io::Error),
    #[error("load failed: {0}")]
    Load(#[source] Errno),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seccomp::bpf::ret;

    fn tiny() -> FilterProgram {
        FilterProgram::new(vec![ret(0x7fff_0000)])
    }

    #[test]
    fn bytes_round_trip() {
        let program = tiny();
        let raw = program.to_bytes();
        assert_eq!(raw.len(), INSN_LEN);
        assert_eq!(FilterProgram::from_bytes(&raw), Ok(program));
    }

    #[test]
    fn malformed_bytecode_is_rejected() {
        assert_eq!(FilterProgram::from_bytes(&[0; 7]), Err(ProgramError::Truncated(7)));
        assert_eq!(FilterProgram::from_bytes(&[]), Err(ProgramError::Empty));
        let huge = vec![0u8; (BPF_MAXINSNS + 1) * INSN_LEN];
        assert_eq!(FilterProgram::from_bytes(&huge), Err(ProgramError::TooLong(BPF_MAXINSNS + 1)));
    }

    #[test]
    fn export_writes_instruction_array() {
        let mut out = Vec::new();
        tiny().dispatch(Sink::Export(&mut out)).unwrap();
        assert_eq!(out, tiny().to_bytes());
    }

    #[test]
    fn oversized_program_is_refused_by_sinks() {
        let program = FilterProgram::new(vec![ret(0); BPF_MAXINSNS + 1]);
        let mut out = Vec::new();
        let err = program.export(&mut out).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::E2BIG));
        assert!(out.is_empty());
        // rejected before any prctl, so this does not confine the test runner
        assert_eq!(program.load(), Err(Errno::E2BIG));
    }

    #[test]
    fn broken_writer_surfaces_as_export_error() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from_raw_os_error(libc::EPIPE))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let err = tiny().dispatch(Sink::Export(&mut Broken)).unwrap_err();
        assert!(matches!(err, SinkError::Export(e) if e.raw_os_error() == Some(libc::EPIPE)));
    }
}
