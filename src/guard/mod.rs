//! Lifecycle signal guard for the shim process.
//!
//! The monitor asks the shim to exit by sending SIGCONT; the shim also
//! receives SIGCONT as its parent-death signal. The handler tells the two
//! apart by sender pid and current parent pid and publishes one
//! [`SignalOutcome`], either as an exit status or as one byte on a pipe.
//!
//! Everything reachable from the handler is async-signal-safe: no
//! allocation, no locks, no logging.

mod channel;

use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use thiserror::Error;

pub use channel::{outcome_channel, OutcomeReceiver, ReceiveError};

/// Exit status when the monitor requested termination.
pub const EXIT_REQUESTED_STATUS: i32 = 254;
/// Exit status when the monitor vanished without asking.
pub const ORPHANED_STATUS: i32 = 3;

/// Result of one SIGCONT delivery. Discriminants are the wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SignalOutcome {
    ExitRequested = 0,
    Orphaned = 1,
    Invalid = 2,
    UnexpectedSender = 3,
}

impl SignalOutcome {
    pub const fn wire(self) -> u8 {
        self as u8
    }

    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SignalOutcome::ExitRequested),
            1 => Some(SignalOutcome::Orphaned),
            2 => Some(SignalOutcome::Invalid),
            3 => Some(SignalOutcome::UnexpectedSender),
            _ => None,
        }
    }

    /// Status the shim exits with, for outcomes that end it.
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            SignalOutcome::ExitRequested => Some(EXIT_REQUESTED_STATUS),
            SignalOutcome::Orphaned => Some(ORPHANED_STATUS),
            SignalOutcome::Invalid | SignalOutcome::UnexpectedSender => None,
        }
    }
}

/// Where the handler publishes outcomes.
#[derive(Debug)]
pub enum OutcomeTarget {
    /// `_exit` with [`SignalOutcome::exit_code`] directly from the handler.
    Exit,
    /// Write the wire byte; the reading side decides what to do.
    Channel(OwnedFd),
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("SIGCONT already has a non-default disposition")]
    DispositionNotDefault,
    #[error("cannot query SIGCONT disposition: {0}")]
    Query(#[source] Errno),
    #[error("cannot make outcome channel non-blocking: {0}")]
    NonBlocking(#[source] Errno),
    #[error("cannot install SIGCONT handler: {0}")]
    Install(#[source] Errno),
}

impl GuardError {
    pub fn errno(&self) -> Errno {
        match self {
            GuardError::DispositionNotDefault => Errno::ENOTRECOVERABLE,
            GuardError::Query(errno) | GuardError::NonBlocking(errno) | GuardError::Install(errno) => *errno,
        }
    }
}

#[derive(Debug)]
struct GuardState {
    monitor: libc::pid_t,
    target: OutcomeTarget,
}

/// Claimed on entry to [`install`]; released only by failures that happen
/// before the state is published.
static INSTALLED: AtomicBool = AtomicBool::new(false);
/// Set once the handler is registered.
static HANDLER_LIVE: AtomicBool = AtomicBool::new(false);
static GUARD: OnceLock<GuardState> = OnceLock::new();

/// Install the SIGCONT handler for this process.
///
/// Fails without side effects if SIGCONT is not at its default
/// disposition. A second call after a successful one aborts the process.
///
/// If registering the handler itself fails, the state slot is already
/// spent: the target is kept, [`is_installed`] stays false and any further
/// call aborts.
pub fn install(monitor: Pid, target: OutcomeTarget) -> Result<(), GuardError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        std::process::abort();
    }

    let prepared = check_default_disposition().and_then(|()| match &target {
        OutcomeTarget::Channel(fd) => set_nonblocking(fd),
        OutcomeTarget::Exit => Ok(()),
    });
    if let Err(err) = prepared {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(err);
    }

    let state = GuardState {
        monitor: monitor.as_raw(),
        target,
    };
    if GUARD.set(state).is_err() {
        std::process::abort();
    }

    let action = SigAction::new(
        SigHandler::SigAction(on_continue),
        SaFlags::SA_ONSTACK | SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGCONT, &action) }.map_err(GuardError::Install)?;
    HANDLER_LIVE.store(true, Ordering::SeqCst);
    Ok(())
}

/// True once the SIGCONT handler is registered.
pub fn is_installed() -> bool {
    HANDLER_LIVE.load(Ordering::SeqCst)
}

fn check_default_disposition() -> Result<(), GuardError> {
    let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::sigaction(libc::SIGCONT, ptr::null(), &mut old) };
    Errno::result(ret).map_err(GuardError::Query)?;
    if old.sa_sigaction != libc::SIG_DFL {
        return Err(GuardError::DispositionNotDefault);
    }
    Ok(())
}

fn set_nonblocking(fd: &OwnedFd) -> Result<(), GuardError> {
    let raw = fd.as_raw_fd();
    let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(GuardError::NonBlocking)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(GuardError::NonBlocking)?;
    Ok(())
}

/// Classify one delivery. `parent` is only consulted when the sender is
/// not the monitor, and is evaluated at call time.
pub fn classify(
    signo: libc::c_int,
    sender: Option<libc::pid_t>,
    monitor: libc::pid_t,
    parent: impl FnOnce() -> libc::pid_t,
) -> SignalOutcome {
    let sender = match sender {
        Some(pid) if signo == libc::SIGCONT => pid,
        _ => return SignalOutcome::Invalid,
    };
    if sender == monitor {
        SignalOutcome::ExitRequested
    } else if parent() != monitor {
        SignalOutcome::Orphaned
    } else {
        SignalOutcome::UnexpectedSender
    }
}

extern "C" fn on_continue(signo: libc::c_int, info: *mut libc::siginfo_t, _ucontext: *mut libc::c_void) {
    let Some(state) = GUARD.get() else {
        std::process::abort();
    };
    let sender = if info.is_null() {
        None
    } else {
        Some(unsafe { (*info).si_pid() })
    };
    let outcome = classify(signo, sender, state.monitor, || unsafe { libc::getppid() });
    publish(&state.target, outcome);
}

fn publish(target: &OutcomeTarget, outcome: SignalOutcome) {
    match target {
        OutcomeTarget::Exit => {
            if let Some(status) = outcome.exit_code() {
                unsafe { libc::_exit(status) };
            }
            if outcome == SignalOutcome::Invalid {
                std::process::abort();
            }
        }
        OutcomeTarget::Channel(fd) => {
            write_outcome(fd.as_raw_fd(), outcome.wire());
            if outcome == SignalOutcome::Invalid {
                std::process::abort();
            }
        }
    }
}

/// One non-blocking byte. A full pipe drops the byte; any other failure
/// aborts. errno is restored for the interrupted code.
fn write_outcome(fd: libc::c_int, byte: u8) {
    let saved = Errno::last_raw();
    let ret = unsafe { libc::write(fd, ptr::addr_of!(byte).cast(), 1) };
    if ret < 0 && Errno::last() != Errno::EAGAIN {
        std::process::abort();
    }
    Errno::set_raw(saved);
}

/// Deliver SIGCONT to this process when its parent dies. The kernel
/// reports the dying parent as sender, so this reads as
/// [`SignalOutcome::Orphaned`] whenever the parent is not the monitor.
pub fn arm_parent_death_signal() -> Result<(), Errno> {
    nix::sys::prctl::set_pdeathsig(Signal::SIGCONT)
}
