#![cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]

use rstest::rstest;

use confine::seccomp::catalog::CLONE_NEWUSER;
use confine::seccomp::{
    build, simulate, Arch, ArchitectureSpec, FilterProgram, PolicyFlags, SeccompData, Syscall, Verdict,
};

const EPERM: Verdict = Verdict::Errno(libc::EPERM as u16);
const ENOSYS: Verdict = Verdict::Errno(libc::ENOSYS as u16);
const EAFNOSUPPORT: Verdict = Verdict::Errno(libc::EAFNOSUPPORT as u16);

fn native() -> Arch {
    Arch::native().unwrap()
}

fn native_only() -> ArchitectureSpec {
    ArchitectureSpec::of(native(), None)
}

fn call(program: &FilterProgram, arch: Arch, syscall: Syscall, args: [u64; 6]) -> Verdict {
    let data = SeccompData::for_syscall(arch, syscall)
        .unwrap_or_else(|| panic!("{syscall} missing on {arch}"))
        .with_args(args);
    simulate(program, &data).unwrap()
}

fn socket(program: &FilterProgram, arch: Arch, family: u64) -> Verdict {
    call(program, arch, Syscall::Socket, [family, libc::SOCK_STREAM as u64, 0, 0, 0, 0])
}

#[test]
fn namespace_policy_end_to_end() {
    let program = build(native_only(), PolicyFlags::DENY_NAMESPACE).unwrap();
    let arch = native();

    for syscall in [Syscall::Unshare, Syscall::Setns, Syscall::Mount, Syscall::Umount2, Syscall::PivotRoot] {
        assert_eq!(call(&program, arch, syscall, [0; 6]), EPERM, "{syscall}");
    }
    for syscall in [Syscall::Clone3, Syscall::OpenTree, Syscall::Fsopen, Syscall::MountSetattr] {
        assert_eq!(call(&program, arch, syscall, [0; 6]), ENOSYS, "{syscall}");
    }

    let plain_clone = libc::CLONE_VM as u64 | libc::SIGCHLD as u64;
    assert_eq!(call(&program, arch, Syscall::Clone, [plain_clone, 0, 0, 0, 0, 0]), Verdict::Allow);
    assert_eq!(
        call(&program, arch, Syscall::Clone, [plain_clone | CLONE_NEWUSER, 0, 0, 0, 0, 0]),
        EPERM
    );

    if arch == Arch::X86_64 {
        assert_eq!(call(&program, arch, Syscall::ModifyLdt, [0; 6]), EPERM);
    }

    for family in [libc::AF_UNSPEC, libc::AF_UNIX, libc::AF_INET, libc::AF_INET6, libc::AF_NETLINK] {
        assert_eq!(socket(&program, arch, family as u64), Verdict::Allow, "family {family}");
    }
    for family in 0..64u64 {
        if ![0, 1, 2, 10, 16].contains(&family) {
            assert_eq!(socket(&program, arch, family), EAFNOSUPPORT, "family {family}");
        }
    }
    assert_eq!(socket(&program, arch, u64::from(u32::MAX)), EAFNOSUPPORT);
}

#[test]
fn clone_denial_depends_only_on_the_namespace_bit() {
    let program = build(native_only(), PolicyFlags::DENY_NAMESPACE).unwrap();
    for other_bits in [0u64, 0x11, 0x0fff_ffff, 0xefff_ffff, 0xffff_ffff_efff_ffff] {
        assert_eq!(call(&program, native(), Syscall::Clone, [other_bits, 0, 0, 0, 0, 0]), Verdict::Allow);
        assert_eq!(
            call(&program, native(), Syscall::Clone, [other_bits | CLONE_NEWUSER, 0, 0, 0, 0, 0]),
            EPERM
        );
    }
}

#[rstest]
#[case(PolicyFlags::empty(), &[])]
#[case(PolicyFlags::ALLOW_CAN, &[libc::AF_CAN])]
#[case(PolicyFlags::ALLOW_BLUETOOTH, &[libc::AF_BLUETOOTH])]
#[case(PolicyFlags::ALLOW_CAN | PolicyFlags::ALLOW_BLUETOOTH, &[libc::AF_CAN, libc::AF_BLUETOOTH])]
fn optional_families_follow_flags(#[case] flags: PolicyFlags, #[case] extra: &[libc::c_int]) {
    let program = build(native_only(), flags).unwrap();
    for family in [libc::AF_CAN, libc::AF_BLUETOOTH] {
        let expected = if extra.contains(&family) { Verdict::Allow } else { EAFNOSUPPORT };
        assert_eq!(socket(&program, native(), family as u64), expected, "family {family}");
    }
    assert_eq!(socket(&program, native(), libc::AF_PACKET as u64), EAFNOSUPPORT);
    assert_eq!(socket(&program, native(), 30), EAFNOSUPPORT);
}

#[test]
fn tty_injection_ioctls_only() {
    let program = build(native_only(), PolicyFlags::DENY_TTY).unwrap();
    let ioctl = |request: u64| call(&program, native(), Syscall::Ioctl, [0, request, 0, 0, 0, 0]);
    assert_eq!(ioctl(libc::TIOCSTI as u64), EPERM);
    assert_eq!(ioctl(0x541c), EPERM);
    assert_eq!(ioctl(0xffff_ffff_0000_5412), EPERM);
    assert_eq!(ioctl(libc::TIOCGWINSZ as u64), Verdict::Allow);
    assert_eq!(ioctl(libc::FIONREAD as u64), Verdict::Allow);
}

#[rstest]
#[case(PolicyFlags::DENY_DEVEL, 0x0000, 0x0008)]
#[case(PolicyFlags::DENY_DEVEL | PolicyFlags::LINUX32, 0x0008, 0x0000)]
fn personality_outside_allowed_domain(#[case] flags: PolicyFlags, #[case] allowed: u64, #[case] other: u64) {
    let program = build(native_only(), flags).unwrap();
    let arch = native();
    assert_eq!(call(&program, arch, Syscall::Personality, [allowed, 0, 0, 0, 0, 0]), Verdict::Allow);
    assert_eq!(call(&program, arch, Syscall::Personality, [other, 0, 0, 0, 0, 0]), EPERM);
    assert_eq!(call(&program, arch, Syscall::Personality, [0xffff_ffff, 0, 0, 0, 0, 0]), EPERM);
    assert_eq!(call(&program, arch, Syscall::Ptrace, [0; 6]), EPERM);
    assert_eq!(call(&program, arch, Syscall::PerfEventOpen, [0; 6]), EPERM);
}

#[test]
fn extended_groups_follow_parent_gates() {
    let arch = native();
    let extended = build(native_only(), PolicyFlags::EXTENDED).unwrap();
    assert_eq!(call(&extended, arch, Syscall::Reboot, [0; 6]), EPERM);
    assert_eq!(call(&extended, arch, Syscall::InitModule, [0; 6]), EPERM);
    assert_eq!(call(&extended, arch, Syscall::Setuid, [0; 6]), Verdict::Allow);

    let strict = build(native_only(), PolicyFlags::STRICT).unwrap();
    assert_eq!(call(&strict, arch, Syscall::Setuid, [0; 6]), EPERM);
    assert_eq!(call(&strict, arch, Syscall::Fchownat, [0; 6]), EPERM);

    let plain = build(native_only(), PolicyFlags::DENY_NAMESPACE).unwrap();
    assert_eq!(call(&plain, arch, Syscall::Reboot, [0; 6]), Verdict::Allow);
    assert_eq!(call(&plain, arch, Syscall::Setuid, [0; 6]), Verdict::Allow);
}

#[cfg(target_arch = "x86_64")]
mod multiarch {
    use super::*;

    fn with_i386(flags: PolicyFlags) -> FilterProgram {
        build(ArchitectureSpec::of(Arch::X86_64, Some(Arch::X86)), flags).unwrap()
    }

    #[test]
    fn secondary_architecture_needs_the_flag() {
        let program = with_i386(PolicyFlags::empty());
        assert_eq!(call(&program, Arch::X86, Syscall::Mount, [0; 6]), Verdict::KillProcess);
        assert_eq!(call(&program, Arch::X86_64, Syscall::Mount, [0; 6]), Verdict::Allow);
        assert_eq!(call(&program, Arch::X86_64, Syscall::ModifyLdt, [0; 6]), EPERM);
    }

    #[test]
    fn secondary_architecture_drops_emulation_denials() {
        let program = with_i386(PolicyFlags::ALLOW_SECONDARY_ARCH | PolicyFlags::EXTENDED);
        assert_eq!(call(&program, Arch::X86_64, Syscall::ModifyLdt, [0; 6]), Verdict::Allow);
        assert_eq!(call(&program, Arch::X86, Syscall::ModifyLdt, [0; 6]), Verdict::Allow);
        assert_eq!(call(&program, Arch::X86, Syscall::Vm86, [0; 6]), Verdict::Allow);
        assert_eq!(call(&program, Arch::X86, Syscall::Syslog, [0; 6]), EPERM);
        assert_eq!(call(&program, Arch::X86, Syscall::ClockSettime64, [0; 6]), EPERM);
    }

    #[test]
    fn emulation_denials_cover_i386_only_syscalls() {
        // a primary architecture is always added, secondary flag or not
        let program = build(ArchitectureSpec::of(Arch::X86, None), PolicyFlags::EXTENDED).unwrap();
        assert_eq!(call(&program, Arch::X86, Syscall::Vm86, [0; 6]), ENOSYS);
        assert_eq!(call(&program, Arch::X86, Syscall::Vm86old, [0; 6]), ENOSYS);
        assert_eq!(call(&program, Arch::X86, Syscall::ModifyLdt, [0; 6]), EPERM);
        assert_eq!(call(&program, Arch::X86_64, Syscall::ModifyLdt, [0; 6]), EPERM);
    }

    #[test]
    fn namespace_denials_use_i386_numbers() {
        let program = with_i386(PolicyFlags::ALLOW_SECONDARY_ARCH | PolicyFlags::DENY_NAMESPACE);
        assert_eq!(call(&program, Arch::X86, Syscall::Umount, [0; 6]), EPERM);
        assert_eq!(call(&program, Arch::X86, Syscall::Unshare, [0; 6]), EPERM);
        assert_eq!(
            call(&program, Arch::X86, Syscall::Clone, [CLONE_NEWUSER, 0, 0, 0, 0, 0]),
            EPERM
        );
        // x86_64 syscall 22 is pipe, untouched
        let pipe = SeccompData::new(Arch::X86_64.token(), 22);
        assert_eq!(simulate(&program, &pipe).unwrap(), Verdict::Allow);
    }

    #[test]
    fn socket_families_are_not_filtered_through_socketcall() {
        let program = with_i386(PolicyFlags::ALLOW_SECONDARY_ARCH);
        assert_eq!(socket(&program, Arch::X86_64, libc::AF_PACKET as u64), EAFNOSUPPORT);
        assert_eq!(socket(&program, Arch::X86, libc::AF_PACKET as u64), Verdict::Allow);
    }
}

mod load {
    use std::io::Write;

    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};

    use confine::seccomp::{compile, export, Sink};

    use super::*;

    /// Load the filter in a forked child and report what the kernel does.
    #[test]
    fn loaded_filter_confines_the_child() {
        // Build before forking; the child only makes raw syscalls.
        let program = build(native_only(), PolicyFlags::DENY_NAMESPACE).unwrap();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let status = (|| {
                    if program.load().is_err() {
                        return 10;
                    }
                    let ret = unsafe { libc::unshare(libc::CLONE_NEWUSER) };
                    if ret != -1 || nix::errno::Errno::last() != nix::errno::Errno::EPERM {
                        return 11;
                    }
                    let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, 0) };
                    if fd != -1 || nix::errno::Errno::last() != nix::errno::Errno::EAFNOSUPPORT {
                        return 12;
                    }
                    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
                    if fd < 0 {
                        return 13;
                    }
                    unsafe { libc::close(fd) };
                    let ret = unsafe { libc::syscall(libc::SYS_syslog, 3, std::ptr::null_mut::<u8>(), 0) };
                    if ret != -1 || nix::errno::Errno::last() != nix::errno::Errno::EPERM {
                        return 14;
                    }
                    0
                })();
                unsafe { libc::_exit(status) };
            }
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).unwrap();
                assert_eq!(status, WaitStatus::Exited(child, 0));
            }
        }
    }

    #[test]
    fn export_sink_writes_loadable_bytes() {
        let bytes = export(native_only(), PolicyFlags::STRICT).unwrap();
        let program = FilterProgram::from_bytes(&bytes).unwrap();
        assert_eq!(program, build(native_only(), PolicyFlags::STRICT).unwrap());

        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from_raw_os_error(libc::EBADF))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let err = compile(native_only(), PolicyFlags::empty(), Sink::Export(&mut Closed)).unwrap_err();
        assert_eq!(err.code(), 6);
        assert_eq!(err.errno(), Some(nix::errno::Errno::EBADF));
    }
}
