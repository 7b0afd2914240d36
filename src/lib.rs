//! confine - seccomp policy compiler and shim lifecycle guard.
//!
//! [`seccomp`] turns policy flags into a seccomp-bpf filter that is either
//! loaded into the calling process or exported as bytecode. [`guard`] is the
//! SIGCONT handshake between a monitor and the shim it supervises.

pub mod config;
pub mod guard;
pub mod logging;
pub mod seccomp;

pub use seccomp::{compile, CompileError, PolicyFlags, Sink};
