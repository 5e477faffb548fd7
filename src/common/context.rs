//! Host detection: operating system, privileges and architecture.
//!
//! [`Context::detect`] probes the host once and returns a read-only snapshot.
//! Nothing here tracks live system state; re-detect if the host may have
//! changed.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use sudo::RunningAs;

use crate::common::error::ProvisionError;
use crate::common::runner::{CommandLine, CommandRunner};
use crate::ui::prelude::*;

const OS_RELEASE: &str = "/etc/os-release";
const KERNEL_VERSION: &str = "/proc/sys/kernel/version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OsType {
    ArchLinux,
    Ubuntu,
    Debian,
    MacOs,
    Other,
}

impl OsType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArchLinux => "Arch Linux",
            Self::Ubuntu => "Ubuntu",
            Self::Debian => "Debian",
            Self::MacOs => "macOS",
            Self::Other => "Other",
        }
    }

    /// Uses pacman
    pub fn is_arch_based(&self) -> bool {
        matches!(self, Self::ArchLinux)
    }

    /// Uses apt
    pub fn is_debian_based(&self) -> bool {
        matches!(self, Self::Ubuntu | Self::Debian)
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Map a platform name and (for Linux) a distribution id to an [`OsType`].
///
/// Distribution ids are compared case-insensitively. Unknown or missing Linux
/// ids map to [`OsType::Other`]; Windows and unknown platforms are errors.
pub fn os_type_for(system: &str, distro_id: Option<&str>) -> Result<OsType, ProvisionError> {
    match system.to_lowercase().as_str() {
        "linux" => {
            let id = distro_id.unwrap_or_default().to_lowercase();
            Ok(match id.as_str() {
                "ubuntu" => OsType::Ubuntu,
                "arch" => OsType::ArchLinux,
                "debian" => OsType::Debian,
                _ => OsType::Other,
            })
        }
        "darwin" | "macos" => Ok(OsType::MacOs),
        "windows" => Err(ProvisionError::WindowsUnsupported),
        other => Err(ProvisionError::UnsupportedPlatform {
            system: other.to_string(),
        }),
    }
}

/// Detect the operating system of the running host.
pub fn get_os_type() -> Result<OsType, ProvisionError> {
    let system = current_system();
    let distro = if system == "linux" { distro_id() } else { None };
    os_type_for(system, distro.as_deref())
}

/// Lower-case platform name, using "darwin" for macOS.
pub fn current_system() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// The `ID=` field of `/etc/os-release`, if present.
pub fn distro_id() -> Option<String> {
    let content = fs::read_to_string(Path::new(OS_RELEASE)).ok()?;
    parse_os_release_id(&content)
}

fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("ID="))
        .map(|val| val.trim_matches(|c| c == '"' || c == '\'').to_lowercase())
        .filter(|id| !id.is_empty())
}

/// Whether `sudo` elevation works. May prompt for a password.
pub fn check_sudo(runner: &dyn CommandRunner) -> bool {
    runner.probe(&CommandLine::sudo("true"))
}

fn os_version(runner: &dyn CommandRunner) -> String {
    os_version_from(fs::read_to_string(KERNEL_VERSION).ok(), runner)
}

/// Kernel version from procfs, falling back to `uname -v`.
fn os_version_from(procfs: Option<String>, runner: &dyn CommandRunner) -> String {
    if let Some(version) = procfs {
        return version.trim().to_string();
    }
    runner
        .inspect(&CommandLine::new("uname").arg("-v"))
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn pointer_width() -> String {
    format!("{}bit", usize::BITS)
}

/// Immutable snapshot of the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    os_type: OsType,
    os_version: String,
    sudo: bool,
    root_privileges: bool,
    arch: String,
    system: String,
}

impl Context {
    /// Probe the host and log one record per field.
    ///
    /// The sudo probe runs exactly once and blocks on an interactive password
    /// prompt if sudo asks for one.
    pub fn detect(runner: &dyn CommandRunner) -> Result<Self> {
        let os_type = get_os_type()?;
        Ok(Self::probe(runner, os_type, current_system()))
    }

    /// [`Context::detect`] for a given platform name and distribution id.
    #[cfg(test)]
    pub fn detect_with(
        runner: &dyn CommandRunner,
        system: &str,
        distro_id: Option<&str>,
    ) -> Result<Self> {
        let os_type = os_type_for(system, distro_id)?;
        Ok(Self::probe(runner, os_type, system))
    }

    fn probe(runner: &dyn CommandRunner, os_type: OsType, system: &str) -> Self {
        let os_version = os_version(runner);
        let sudo = check_sudo(runner);
        let root_privileges = matches!(sudo::check(), RunningAs::Root);

        let ctx = Self {
            os_type,
            os_version,
            sudo,
            root_privileges,
            arch: pointer_width(),
            system: system.to_lowercase(),
        };
        ctx.log();
        ctx
    }

    /// Build a snapshot from known values instead of probing.
    pub fn new(
        os_type: OsType,
        os_version: impl Into<String>,
        sudo: bool,
        root_privileges: bool,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            os_type,
            os_version: os_version.into(),
            sudo,
            root_privileges,
            arch: arch.into(),
            system: current_system().to_string(),
        }
    }

    pub fn os_type(&self) -> OsType {
        self.os_type
    }

    pub fn os_version(&self) -> &str {
        &self.os_version
    }

    pub fn sudo(&self) -> bool {
        self.sudo
    }

    pub fn root_privileges(&self) -> bool {
        self.root_privileges
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn log(&self) {
        let records: [(&str, String, serde_json::Value); 6] = [
            ("os_type", format!("OS Type: {}", self.os_type), serde_json::json!(self.os_type)),
            ("os_version", format!("OS Version: {}", self.os_version()), serde_json::json!(self.os_version())),
            ("sudo", format!("Sudo: {}", self.sudo), serde_json::json!(self.sudo)),
            ("root_privileges", format!("Root privileges: {}", self.root_privileges), serde_json::json!(self.root_privileges)),
            ("arch", format!("Architecture: {}", self.arch()), serde_json::json!(self.arch())),
            ("system", format!("System: {}", self.system()), serde_json::json!(self.system())),
        ];
        for (field, message, value) in records {
            emit(Level::Info, &format!("context.{}", field), &message, Some(value));
        }
        separator();
    }
}
