//! SIGCONT guard behaviour in forked children.
//!
//! The guard is process-wide and install-once, so every scenario runs in
//! its own child and is judged by the child's exit status. Children only
//! make raw system calls between fork and exit.

use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use confine::guard::{
    arm_parent_death_signal, install, is_installed, outcome_channel, GuardError, OutcomeTarget, SignalOutcome,
};

/// A pid no live process is expected to have.
const ABSENT_PID: i32 = 0x3fff_fff0;

fn in_child(scenario: fn() -> i32) -> WaitStatus {
    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            let status = scenario();
            unsafe { libc::_exit(status) }
        }
        ForkResult::Parent { child } => waitpid(child, None).unwrap(),
    }
}

fn raise_cont() {
    unsafe { libc::kill(libc::getpid(), libc::SIGCONT) };
}

fn exited_with(status: WaitStatus, code: i32) {
    match status {
        WaitStatus::Exited(_, got) => assert_eq!(got, code),
        other => panic!("expected exit {code}, got {other:?}"),
    }
}

#[test]
fn monitor_request_exits_with_254() {
    let status = in_child(|| {
        if is_installed() {
            return 12;
        }
        let me = Pid::this();
        if install(me, OutcomeTarget::Exit).is_err() {
            return 10;
        }
        if !is_installed() {
            return 13;
        }
        raise_cont();
        // unreachable when the handler exits
        11
    });
    exited_with(status, SignalOutcome::ExitRequested.exit_code().unwrap());
}

#[test]
fn orphaned_shim_exits_with_3() {
    let status = in_child(|| {
        if install(Pid::from_raw(ABSENT_PID), OutcomeTarget::Exit).is_err() {
            return 10;
        }
        raise_cont();
        11
    });
    exited_with(status, 3);
}

#[test]
fn unexpected_sender_is_reported_and_shim_continues() {
    let status = in_child(|| {
        let Ok((mut receiver, sender)) = outcome_channel() else {
            return 10;
        };
        if install(Pid::parent(), OutcomeTarget::Channel(sender)).is_err() {
            return 11;
        }
        raise_cont();
        match receiver.recv() {
            Ok(Some(SignalOutcome::UnexpectedSender)) => 0,
            Ok(_) => 12,
            Err(_) => 13,
        }
    });
    exited_with(status, 0);
}

#[test]
fn channel_variant_reports_exit_request_without_exiting() {
    let status = in_child(|| {
        let Ok((mut receiver, sender)) = outcome_channel() else {
            return 10;
        };
        if install(Pid::this(), OutcomeTarget::Channel(sender)).is_err() {
            return 11;
        }
        raise_cont();
        match receiver.recv() {
            Ok(Some(SignalOutcome::ExitRequested)) => 0,
            Ok(_) => 12,
            Err(_) => 13,
        }
    });
    exited_with(status, 0);
}

#[test]
fn channel_variant_reports_orphan() {
    let status = in_child(|| {
        let Ok((mut receiver, sender)) = outcome_channel() else {
            return 10;
        };
        if install(Pid::from_raw(ABSENT_PID), OutcomeTarget::Channel(sender)).is_err() {
            return 11;
        }
        raise_cont();
        match receiver.recv() {
            Ok(Some(SignalOutcome::Orphaned)) => 0,
            Ok(_) => 12,
            Err(_) => 13,
        }
    });
    exited_with(status, 0);
}

#[test]
fn closed_channel_aborts_on_delivery() {
    let status = in_child(|| {
        let Ok((receiver, sender)) = outcome_channel() else {
            return 10;
        };
        drop(receiver);
        unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
        if install(Pid::parent(), OutcomeTarget::Channel(sender)).is_err() {
            return 11;
        }
        raise_cont();
        12
    });
    assert!(
        matches!(status, WaitStatus::Signaled(_, Signal::SIGABRT, _)),
        "expected SIGABRT, got {status:?}"
    );
}

#[test]
fn non_default_disposition_is_left_alone() {
    let status = in_child(|| {
        unsafe { libc::signal(libc::SIGCONT, libc::SIG_IGN) };
        match install(Pid::this(), OutcomeTarget::Exit) {
            Err(err @ GuardError::DispositionNotDefault) => {
                if err.errno() != nix::errno::Errno::ENOTRECOVERABLE {
                    return 12;
                }
            }
            Err(_) => return 11,
            Ok(()) => return 10,
        }
        if is_installed() {
            return 13;
        }
        // would exit 254 if the handler had been installed
        raise_cont();
        let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
        unsafe { libc::sigaction(libc::SIGCONT, std::ptr::null(), &mut current) };
        if current.sa_sigaction != libc::SIG_IGN {
            return 14;
        }
        0
    });
    exited_with(status, 0);
}

#[test]
fn failed_install_can_be_retried() {
    let status = in_child(|| {
        unsafe { libc::signal(libc::SIGCONT, libc::SIG_IGN) };
        if install(Pid::this(), OutcomeTarget::Exit).is_ok() {
            return 10;
        }
        unsafe { libc::signal(libc::SIGCONT, libc::SIG_DFL) };
        if install(Pid::this(), OutcomeTarget::Exit).is_err() {
            return 11;
        }
        raise_cont();
        12
    });
    exited_with(status, 254);
}

#[test]
fn second_install_aborts() {
    let status = in_child(|| {
        if install(Pid::this(), OutcomeTarget::Exit).is_err() {
            return 10;
        }
        let _ = install(Pid::this(), OutcomeTarget::Exit);
        11
    });
    assert!(
        matches!(status, WaitStatus::Signaled(_, Signal::SIGABRT, _)),
        "expected SIGABRT, got {status:?}"
    );
}

#[test]
fn parent_death_signal_is_sigcont() {
    let status = in_child(|| {
        if arm_parent_death_signal().is_err() {
            return 10;
        }
        let mut signo: libc::c_int = 0;
        let ret = unsafe { libc::prctl(libc::PR_GET_PDEATHSIG, &mut signo as *mut libc::c_int) };
        if ret != 0 || signo != libc::SIGCONT {
            return 11;
        }
        0
    });
    exited_with(status, 0);
}
