//! Policy configuration file and path resolution.
//!
//! JSON via serde. Every field is optional; an empty object is the
//! baseline-only policy for the native architecture pair.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::seccomp::{Arch, ArchitectureSpec, PolicyFlags};

/// Larger files are rejected unread.
pub const MAX_CONFIG_LEN: u64 = 16 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is {len} bytes, limit is {MAX_CONFIG_LEN}")]
    TooLarge { path: PathBuf, len: u64 },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown architecture {0:?}")]
    UnknownArch(String),
}

/// An architecture by name (`"x86_64"`) or raw audit token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArchRef {
    Token(u32),
    Name(String),
}

impl ArchRef {
    pub fn token(&self) -> Result<u32, ConfigError> {
        match self {
            ArchRef::Token(token) => Ok(*token),
            ArchRef::Name(name) => Arch::from_name(name)
                .map(Arch::token)
                .ok_or_else(|| ConfigError::UnknownArch(name.clone())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchitectureConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<ArchRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<ArchRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Start from the strict preset before applying the switches below.
    pub strict: bool,
    pub deny_namespace: bool,
    pub deny_tty: bool,
    pub deny_devel: bool,
    pub allow_secondary_arch: bool,
    pub linux32: bool,
    pub allow_can: bool,
    pub allow_bluetooth: bool,
    pub extended: bool,
    pub verbose: bool,
    /// Absent means the native architecture and its compat partner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<ArchitectureConfig>,
}

impl PolicyConfig {
    /// `$XDG_CONFIG_HOME/confine/policy.json`, falling back to `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("confine").join("policy.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let read_err = |source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        };
        let len = fs::metadata(path).map_err(read_err)?.len();
        if len > MAX_CONFIG_LEN {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                len,
            });
        }
        let content = fs::read_to_string(path).map_err(read_err)?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn flags(&self) -> PolicyFlags {
        let mut flags = if self.strict {
            PolicyFlags::STRICT
        } else {
            PolicyFlags::empty()
        };
        let switches = [
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
                flags.insert(flag);
            }
        }
        flags
    }

    pub fn architecture(&self) -> Result<ArchitectureSpec, ConfigError> {
        let Some(arch) = &self.architecture else {
            return Ok(ArchitectureSpec::native());
        };
        let primary = match &arch.primary {
            Some(primary) => primary.token()?,
            None => 0,
        };
        let secondary = arch.secondary.as_ref().map(ArchRef::token).transpose()?;
        Ok(ArchitectureSpec::new(primary, secondary))
    }
}
