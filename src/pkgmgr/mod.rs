//! Package manager abstraction.
//!
//! A [`PackageManager`] pairs a [`PackageManagerKind`] with the host
//! [`Context`] and a [`CommandRunner`]. Behaviour per kind lives in a static
//! [`Strategy`] table rather than in a type hierarchy:
//!
//! - Pacman: base Arch Linux setup (makepkg.conf, toolchain, optional mirror ranking)
//! - Yay / Paru: Pacman setup plus a self-bootstrap of the AUR helper
//! - Apt: Debian/Ubuntu toolchain setup
//!
//! Every variant needs sudo; construction fails without it.

mod apt;
mod aur;
pub mod mirrors;
mod pacman;
pub mod sysfile;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::common::config::{DEFAULT_COUNTRY, DEFAULT_MIRROR_COUNT};
use crate::common::context::{Context, OsType};
use crate::common::error::ProvisionError;
use crate::common::runner::{CommandLine, CommandRunner};
use crate::ui::prelude::*;

pub use aur::AurHelper;
pub use sysfile::SystemFiles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    Pacman,
    Yay,
    Paru,
    Apt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Arch,
    Debian,
}

/// Options for [`PackageManager::setup_pkgmgr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    pub rank_mirrors: bool,
    pub mirror_country: String,
    pub mirror_count: u32,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            rank_mirrors: false,
            mirror_country: DEFAULT_COUNTRY.to_string(),
            mirror_count: DEFAULT_MIRROR_COUNT,
        }
    }
}

type SetupFn = fn(&PackageManager<'_>, &SetupOptions) -> Result<()>;
type UpgradeFn = fn(&PackageManager<'_>) -> Result<()>;

/// Per-kind behaviour.
pub struct Strategy {
    pub name: &'static str,
    pub family: Family,
    /// Program invoked for installs
    pub install_program: &'static str,
    /// Arguments placed before the flags, e.g. `-S`
    pub install_args: &'static [&'static str],
    /// Whether installs run under sudo
    pub elevated_install: bool,
    pub default_flags: &'static [&'static str],
    /// AUR helper bootstrapped from source during setup
    pub aur_helper: Option<AurHelper>,
    setup: SetupFn,
    upgrade: UpgradeFn,
}

const ARCH_FLAGS: &[&str] = &["--noconfirm", "--assume-installed"];

static PACMAN: Strategy = Strategy {
    name: "pacman",
    family: Family::Arch,
    install_program: "pacman",
    install_args: &["-S"],
    elevated_install: true,
    default_flags: ARCH_FLAGS,
    aur_helper: None,
    setup: pacman::setup,
    upgrade: pacman::upgrade,
};

static YAY: Strategy = Strategy {
    name: "yay",
    family: Family::Arch,
    install_program: "yay",
    install_args: &["-S"],
    elevated_install: false,
    default_flags: ARCH_FLAGS,
    aur_helper: Some(AurHelper {
        binary: "yay",
        repo_url: "https://aur.archlinux.org/yay.git",
    }),
    setup: aur::setup,
    upgrade: pacman::upgrade,
};

static PARU: Strategy = Strategy {
    name: "paru",
    family: Family::Arch,
    install_program: "paru",
    install_args: &["-S"],
    elevated_install: false,
    default_flags: ARCH_FLAGS,
    aur_helper: Some(AurHelper {
        binary: "paru",
        repo_url: "https://aur.archlinux.org/paru.git",
    }),
    setup: aur::setup,
    upgrade: pacman::upgrade,
};

static APT: Strategy = Strategy {
    name: "apt",
    family: Family::Debian,
    install_program: "apt-get",
    install_args: &["install"],
    elevated_install: true,
    default_flags: &["-y"],
    aur_helper: None,
    setup: apt::setup,
    upgrade: apt::upgrade,
};

impl PackageManagerKind {
    pub fn strategy(&self) -> &'static Strategy {
        match self {
            Self::Pacman => &PACMAN,
            Self::Yay => &YAY,
            Self::Paru => &PARU,
            Self::Apt => &APT,
        }
    }

    pub fn name(&self) -> &'static str {
        self.strategy().name
    }

    pub fn family(&self) -> Family {
        self.strategy().family
    }

    /// Whether this kind can run on `os`. `Other` accepts anything so an
    /// explicit choice works on unlisted derivatives.
    pub fn supports(&self, os: OsType) -> bool {
        match os {
            OsType::MacOs => false,
            OsType::Other => true,
            os if os.is_arch_based() => self.family() == Family::Arch,
            os if os.is_debian_based() => self.family() == Family::Debian,
            _ => false,
        }
    }

    /// Pick the package manager for `os`, honouring an explicit preference.
    pub fn for_os(os: OsType, preferred: Option<Self>) -> Result<Self, ProvisionError> {
        if let Some(kind) = preferred {
            if !kind.supports(os) {
                return Err(ProvisionError::ManagerMismatch {
                    manager: kind.name(),
                    os,
                });
            }
            return Ok(kind);
        }
        match os {
            OsType::ArchLinux => Ok(Self::Pacman),
            OsType::Ubuntu | OsType::Debian => Ok(Self::Apt),
            OsType::MacOs | OsType::Other => Err(ProvisionError::NoPackageManager(os)),
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9@_+][A-Za-z0-9@._+-]*$").expect("package name pattern is valid")
});

/// Check that every name is a plausible package identifier. Rejects empty
/// lists and names that could be read as flags.
pub fn validate_packages<S: AsRef<str>>(packages: &[S]) -> Result<(), ProvisionError> {
    if packages.is_empty() {
        return Err(ProvisionError::EmptyPackageList);
    }
    for package in packages {
        let name = package.as_ref();
        if !PACKAGE_NAME.is_match(name) {
            return Err(ProvisionError::InvalidPackageName(name.to_string()));
        }
    }
    Ok(())
}

pub struct PackageManager<'a> {
    kind: PackageManagerKind,
    ctx: &'a Context,
    runner: &'a dyn CommandRunner,
    flags: Vec<String>,
    files: SystemFiles,
}

impl<'a> PackageManager<'a> {
    /// Create a manager of `kind`. Fails before running anything if the
    /// context has no sudo, or if `kind` does not fit the detected OS.
    pub fn new(
        kind: PackageManagerKind,
        ctx: &'a Context,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self, ProvisionError> {
        let strategy = kind.strategy();
        if !ctx.sudo() {
            return Err(ProvisionError::MissingPrivilege {
                manager: strategy.name,
            });
        }
        if !kind.supports(ctx.os_type()) {
            return Err(ProvisionError::ManagerMismatch {
                manager: strategy.name,
                os: ctx.os_type(),
            });
        }

        Ok(Self {
            kind,
            ctx,
            runner,
            flags: strategy.default_flags.iter().map(|f| f.to_string()).collect(),
            files: SystemFiles::default(),
        })
    }

    /// Create the default manager for the context's OS.
    pub fn for_context(
        ctx: &'a Context,
        runner: &'a dyn CommandRunner,
        preferred: Option<PackageManagerKind>,
    ) -> Result<Self, ProvisionError> {
        let kind = PackageManagerKind::for_os(ctx.os_type(), preferred)?;
        Self::new(kind, ctx, runner)
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    #[cfg(test)]
    pub fn with_files(mut self, files: SystemFiles) -> Self {
        self.files = files;
        self
    }

    pub fn kind(&self) -> PackageManagerKind {
        self.kind
    }

    pub fn strategy(&self) -> &'static Strategy {
        self.kind.strategy()
    }

    pub fn context(&self) -> &Context {
        self.ctx
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn files(&self) -> &SystemFiles {
        &self.files
    }

    /// Bootstrap the package manager. Call once per environment.
    pub fn setup_pkgmgr(&self, options: &SetupOptions) -> Result<()> {
        (self.strategy().setup)(self, options)
    }

    pub fn upgrade_system(&self) -> Result<()> {
        emit(
            Level::Info,
            "pkgmgr.upgrade",
            &format!("Upgrading system with {}", self.kind),
            None,
        );
        (self.strategy().upgrade)(self)
    }

    /// Install `packages`, in order, with the configured flags.
    pub fn install_package<S: AsRef<str>>(&self, packages: &[S]) -> Result<()> {
        validate_packages(packages)?;
        let names: Vec<&str> = packages.iter().map(|p| p.as_ref()).collect();
        self.install(&names)
    }

    fn install(&self, packages: &[&str]) -> Result<()> {
        let strategy = self.strategy();
        emit(
            Level::Info,
            "pkgmgr.install",
            &format!("Installing with {}: {}", strategy.name, packages.join(" ")),
            Some(serde_json::json!(packages)),
        );

        let command = if strategy.elevated_install {
            CommandLine::sudo(strategy.install_program)
        } else {
            CommandLine::new(strategy.install_program)
        };
        let command = command
            .args(strategy.install_args.iter().copied())
            .args(self.flags.iter().cloned())
            .args(packages.iter().copied());

        self.runner.run(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::runner::testing::RecordingRunner;

    fn arch_ctx(sudo: bool) -> Context {
        Context::new(OsType::ArchLinux, "#1 SMP", sudo, false, "64bit")
    }

    #[test]
    fn test_pacman_install_invocation() {
        let ctx = arch_ctx(true);
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner).unwrap();

        pacman.install_package(&["git", "curl"]).unwrap();

        assert_eq!(
            runner.rendered(),
            vec!["sudo pacman -S --noconfirm --assume-installed git curl"]
        );
    }

    #[test]
    fn test_aur_helpers_install_without_sudo() {
        let ctx = arch_ctx(true);
        for (kind, expected) in [
            (PackageManagerKind::Yay, "yay -S --noconfirm --assume-installed spotify"),
            (PackageManagerKind::Paru, "paru -S --noconfirm --assume-installed spotify"),
        ] {
            let runner = RecordingRunner::new();
            let manager = PackageManager::new(kind, &ctx, &runner).unwrap();
            manager.install_package(&["spotify"]).unwrap();
            assert_eq!(runner.rendered(), vec![expected]);
        }
    }

    #[test]
    fn test_apt_install_invocation() {
        let ctx = Context::new(OsType::Ubuntu, "#1 SMP", true, false, "64bit");
        let runner = RecordingRunner::new();
        let apt = PackageManager::for_context(&ctx, &runner, None).unwrap();
        assert_eq!(apt.kind(), PackageManagerKind::Apt);

        apt.install_package(&["curl".to_string()]).unwrap();
        assert_eq!(runner.rendered(), vec!["sudo apt-get install -y curl"]);
    }

    #[test]
    fn test_missing_sudo_fails_before_running_anything() {
        let ctx = arch_ctx(false);
        let runner = RecordingRunner::new();
        for kind in [
            PackageManagerKind::Pacman,
            PackageManagerKind::Yay,
            PackageManagerKind::Paru,
        ] {
            let err = PackageManager::new(kind, &ctx, &runner).err().unwrap();
            assert!(matches!(err, ProvisionError::MissingPrivilege { .. }));
        }
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_empty_package_list_is_rejected() {
        let ctx = arch_ctx(true);
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner).unwrap();

        let empty: [&str; 0] = [];
        let err = pacman.install_package(&empty).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::EmptyPackageList)
        ));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_invalid_package_names_are_rejected() {
        for bad in ["", "-Rns", "--overwrite=*", ".hidden", "git curl", "a;rm"] {
            let err = validate_packages(&[bad]).unwrap_err();
            assert!(matches!(err, ProvisionError::InvalidPackageName(_)), "{}", bad);
        }
        assert!(validate_packages(&["base-devel", "libc++", "python3.12", "lib32-glibc", "@scope"]).is_ok());
    }

    #[test]
    fn test_install_failure_surfaces_command() {
        let ctx = arch_ctx(true);
        let runner = RecordingRunner::new().fail_on("sudo pacman -S");
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner).unwrap();

        let err = pacman.install_package(&["nonexistent"]).unwrap_err();
        let err = err.downcast::<ProvisionError>().unwrap();
        match err {
            ProvisionError::CommandFailed { command, status } => {
                assert!(command.starts_with("sudo pacman -S"));
                assert_eq!(status, "exit code 1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_flags() {
        let ctx = arch_ctx(true);
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_flags(vec!["--needed".to_string()]);
        pacman.install_package(&["git"]).unwrap();
        assert_eq!(runner.rendered(), vec!["sudo pacman -S --needed git"]);
    }

    #[test]
    fn test_pacman_upgrade() {
        let ctx = arch_ctx(true);
        let runner = RecordingRunner::new();
        let yay = PackageManager::new(PackageManagerKind::Yay, &ctx, &runner).unwrap();
        yay.upgrade_system().unwrap();
        assert_eq!(runner.rendered(), vec!["sudo pacman -Su --noconfirm"]);
    }

    #[test]
    fn test_for_os() {
        assert_eq!(
            PackageManagerKind::for_os(OsType::ArchLinux, None).unwrap(),
            PackageManagerKind::Pacman
        );
        assert_eq!(
            PackageManagerKind::for_os(OsType::ArchLinux, Some(PackageManagerKind::Paru)).unwrap(),
            PackageManagerKind::Paru
        );
        assert_eq!(
            PackageManagerKind::for_os(OsType::Debian, None).unwrap(),
            PackageManagerKind::Apt
        );
        assert!(matches!(
            PackageManagerKind::for_os(OsType::Ubuntu, Some(PackageManagerKind::Yay)),
            Err(ProvisionError::ManagerMismatch { .. })
        ));
        assert!(matches!(
            PackageManagerKind::for_os(OsType::MacOs, None),
            Err(ProvisionError::NoPackageManager(OsType::MacOs))
        ));
        assert_eq!(
            PackageManagerKind::for_os(OsType::Other, Some(PackageManagerKind::Pacman)).unwrap(),
            PackageManagerKind::Pacman
        );
    }

    #[test]
    fn test_new_rejects_mismatched_os() {
        let ctx = Context::new(OsType::Debian, "#1", true, false, "64bit");
        let runner = RecordingRunner::new();
        assert!(matches!(
            PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner),
            Err(ProvisionError::ManagerMismatch { .. })
        ));
    }
}
