//! confine - seccomp policy compiler
//!
//! Commands:
//!   export     Compile a policy and write the BPF bytecode
//!   catalog    Show the rule groups and socket families a policy selects
//!   simulate   Run exported bytecode against one syscall invocation

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use nix::errno::Errno;
use serde::Serialize;
use tracing::{error, info};

use confine::config::{ArchRef, ArchitectureConfig, PolicyConfig};
use confine::logging;
use confine::seccomp::catalog::selected_groups;
use confine::seccomp::family::{family_denials, SocketFamilyAllowEntry, SOCKET_FAMILY_ALLOWLIST};
use confine::seccomp::{
    compile, simulate, Arch, ArchitectureSpec, FilterProgram, PolicyFlags, RuleGroup, SeccompData, Sink,
    Syscall, Verdict,
};

/// Bad configuration file or policy arguments (sysexits EX_CONFIG).
const EXIT_CONFIG: i32 = 78;
/// Unreadable or malformed bytecode (EX_DATAERR).
const EXIT_DATA: i32 = 65;
/// Output could not be written (EX_IOERR).
const EXIT_IO: i32 = 74;

#[derive(Parser)]
#[command(name = "confine")]
#[command(version, about = "seccomp policy compiler for Linux sandboxes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a policy and write the raw sock_filter array
    Export(ExportArgs),
    /// Print the rule groups and socket families a policy selects, as JSON
    Catalog(PolicyArgs),
    /// Evaluate exported bytecode against one syscall invocation
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct PolicyArgs {
    /// JSON policy file (defaults to ~/.config/confine/policy.json if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Primary architecture (name or audit token)
    #[arg(long)]
    arch: Option<String>,

    /// Secondary architecture (name or audit token)
    #[arg(long)]
    secondary_arch: Option<String>,

    /// Extended hardening with namespace, tty and devel denials
    #[arg(long)]
    strict: bool,

    #[arg(long)]
    deny_namespace: bool,

    #[arg(long)]
    deny_tty: bool,

    #[arg(long)]
    deny_devel: bool,

    /// Admit the secondary architecture and legacy emulation syscalls
    #[arg(long)]
    allow_secondary_arch: bool,

    /// Allow the PER_LINUX32 personality instead of PER_LINUX
    #[arg(long)]
    linux32: bool,

    #[arg(long)]
    allow_can: bool,

    #[arg(long)]
    allow_bluetooth: bool,

    #[arg(long)]
    extended: bool,

    /// Log each applied rule group
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    policy: PolicyArgs,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct SimulateArgs {
    /// Exported bytecode
    #[arg(short, long)]
    program: PathBuf,

    /// Architecture the syscall is made on
    #[arg(long)]
    arch: String,

    /// Syscall name or number
    #[arg(long)]
    syscall: String,

    /// Syscall argument as INDEX=VALUE (repeatable, hex with 0x)
    #[arg(long = "arg", value_parser = parse_arg)]
    args: Vec<(usize, u64)>,
}

fn parse_number(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid number {value:?}: {e}"))
}

fn parse_arg(value: &str) -> Result<(usize, u64), String> {
    let (index, arg) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got {value:?}"))?;
    let index: usize = index.parse().map_err(|_| format!("invalid argument index {index:?}"))?;
    if index > 5 {
        return Err(format!("argument index {index} out of range 0..=5"));
    }
    Ok((index, parse_number(arg)?))
}

fn arch_ref(value: &str) -> ArchRef {
    match parse_number(value) {
        Ok(token) => match u32::try_from(token) {
            Ok(token) => ArchRef::Token(token),
            Err(_) => ArchRef::Name(value.to_string()),
        },
        Err(_) => ArchRef::Name(value.to_string()),
    }
}

impl PolicyArgs {
    /// Configuration file overlaid with command-line switches.
    fn resolve(&self) -> Result<(ArchitectureSpec, PolicyFlags), String> {
        let mut config = match self.config_path() {
            Some(path) => PolicyConfig::load(&path).map_err(|e| e.to_string())?,
            None => PolicyConfig::default(),
        };

        if self.arch.is_some() || self.secondary_arch.is_some() {
            let base = config.architecture.take().unwrap_or_default();
            config.architecture = Some(ArchitectureConfig {
                primary: self.arch.as_deref().map(arch_ref).or(base.primary),
                secondary: self.secondary_arch.as_deref().map(arch_ref).or(base.secondary),
            });
        }
        let arch = config.architecture().map_err(|e| e.to_string())?;

        let mut flags = config.flags();
        let switches = [
            (self.strict, PolicyFlags::STRICT),
            (self.deny_namespace, PolicyFlags::DENY_NAMESPACE),
            (self.deny_tty, PolicyFlags::DENY_TTY),
            (self.deny_devel, PolicyFlags::DENY_DEVEL),
            (self.allow_secondary_arch, PolicyFlags::ALLOW_SECONDARY_ARCH),
            (self.linux32, PolicyFlags::LINUX32),
            (self.allow_can, PolicyFlags::ALLOW_CAN),
            (self.allow_bluetooth, PolicyFlags::ALLOW_BLUETOOTH),
            (self.extended, PolicyFlags::EXTENDED),
            (self.verbose, PolicyFlags::VERBOSE),
        ];
        for (on, flag) in switches {
            if on {
                flags |= flag;
            }
        }
        Ok((arch, flags))
    }

    fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        PolicyConfig::default_path().filter(|path| path.exists())
    }
}

fn init_logging(verbose: bool) {
    if let Err(e) = logging::init(verbose) {
        eprintln!("{e}");
    }
}

fn cmd_export(args: &ExportArgs) -> i32 {
    let (arch, flags) = match args.policy.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{e}");
            return EXIT_CONFIG;
        }
    };
    info!(?flags, primary = arch.primary, secondary = ?arch.secondary, "compiling filter");

    let result = match &args.output {
        Some(path) => match File::create(path) {
            Ok(mut file) => compile(arch, flags, Sink::Export(&mut file)),
            Err(e) => {
                error!("cannot create {}: {e}", path.display());
                return EXIT_IO;
            }
        },
        None => {
            let mut stdout = io::stdout().lock();
            compile(arch, flags, Sink::Export(&mut stdout))
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(code = e.code(), "{e}");
            e.code()
        }
    }
}

#[derive(Serialize)]
struct CatalogReport {
    flags: PolicyFlags,
    primary: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary: Option<u32>,
    groups: Vec<&'static RuleGroup>,
    socket_families: Vec<&'static SocketFamilyAllowEntry>,
    denied_family_rules: usize,
}

fn cmd_catalog(args: &PolicyArgs) -> i32 {
    let (arch, flags) = match args.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{e}");
            return EXIT_CONFIG;
        }
    };

    let report = CatalogReport {
        flags,
        primary: arch.primary,
        secondary: arch.secondary.filter(|_| flags.contains(PolicyFlags::ALLOW_SECONDARY_ARCH)),
        groups: selected_groups(flags).collect(),
        socket_families: SOCKET_FAMILY_ALLOWLIST
            .iter()
            .filter(|entry| entry.required.map_or(true, |flag| flags.contains(flag)))
            .collect(),
        denied_family_rules: family_denials(SOCKET_FAMILY_ALLOWLIST, flags).len(),
    };

    let mut stdout = io::stdout().lock();
    let written = serde_json::to_writer_pretty(&mut stdout, &report)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(stdout));
    match written {
        Ok(()) => 0,
        Err(e) => {
            error!("cannot write catalog: {e}");
            EXIT_IO
        }
    }
}

fn read_program(path: &Path) -> Result<FilterProgram, String> {
    let raw = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    FilterProgram::from_bytes(&raw).map_err(|e| format!("{}: {e}", path.display()))
}

fn cmd_simulate(args: &SimulateArgs) -> i32 {
    let program = match read_program(&args.program) {
        Ok(program) => program,
        Err(e) => {
            error!("{e}");
            return EXIT_DATA;
        }
    };

    let Some(arch) = Arch::from_name(&args.arch) else {
        error!("unknown architecture {:?}", args.arch);
        return EXIT_CONFIG;
    };

    let nr = match Syscall::from_name(&args.syscall) {
        Some(syscall) => match syscall.nr(arch) {
            Some(nr) => nr,
            None => {
                error!("{syscall} does not exist on {arch}");
                return EXIT_CONFIG;
            }
        },
        None => match parse_number(&args.syscall).ok().and_then(|n| u32::try_from(n).ok()) {
            Some(nr) => nr,
            None => {
                error!("unknown syscall {:?}", args.syscall);
                return EXIT_CONFIG;
            }
        },
    };

    let data = args
        .args
        .iter()
        .fold(SeccompData::new(arch.token(), nr), |data, &(index, value)| data.with_arg(index, value));

    match simulate(&program, &data) {
        Ok(verdict) => {
            println!("{}", describe(verdict));
            0
        }
        Err(e) => {
            error!("{e}");
            EXIT_DATA
        }
    }
}

fn describe(verdict: Verdict) -> String {
    match verdict {
        Verdict::Allow => "allow".to_string(),
        Verdict::Errno(errno) => format!("errno {errno} ({:?})", Errno::from_raw(i32::from(errno))),
        Verdict::KillProcess => "kill_process".to_string(),
        Verdict::Other(ret) => format!("return {ret:#010x}"),
    }
}

fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Export(args) => args.policy.verbose,
        Command::Catalog(args) => args.verbose,
        Command::Simulate(_) => false,
    };
    init_logging(verbose);

    let code = match &cli.command {
        Command::Export(args) => cmd_export(args),
        Command::Catalog(args) => cmd_catalog(args),
        Command::Simulate(args) => cmd_simulate(args),
    };
    process::exit(code);
}
