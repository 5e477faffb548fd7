use anyhow::{Context, Result};

use super::{PackageManager, SetupOptions, pacman};
use crate::common::error::ProvisionError;
use crate::common::runner::CommandLine;
use crate::ui::prelude::*;

/// An AUR helper that can build itself from its AUR repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AurHelper {
    pub binary: &'static str,
    pub repo_url: &'static str,
}

/// Pacman setup followed by the helper bootstrap.
pub(super) fn setup(mgr: &PackageManager<'_>, options: &SetupOptions) -> Result<()> {
    pacman::setup(mgr, options)?;

    if let Some(helper) = mgr.strategy().aur_helper {
        bootstrap(mgr, helper)?;
    }
    Ok(())
}

/// Clone and build `helper` unless it is already on `PATH`. Returns whether
/// a build happened.
///
/// The scratch directory is a [`tempfile::TempDir`] and is removed on every
/// exit path, including a failed clone or build.
pub fn bootstrap(mgr: &PackageManager<'_>, helper: AurHelper) -> Result<bool> {
    let runner = mgr.runner();
    if let Some(path) = runner.locate(helper.binary) {
        emit(
            Level::Debug,
            "aur.bootstrap",
            &format!("{} already installed at {}", helper.binary, path.display()),
            None,
        );
        return Ok(false);
    }

    if mgr.context().root_privileges() {
        return Err(ProvisionError::BuildAsRoot {
            helper: helper.binary,
        }
        .into());
    }

    emit(
        Level::Info,
        "aur.bootstrap",
        &format!("Installing {} from the AUR", helper.binary),
        None,
    );

    let scratch = tempfile::Builder::new()
        .prefix(&format!("eden-{}-", helper.binary))
        .tempdir()
        .context("creating scratch build directory")?;
    let checkout = scratch.path().join(helper.binary);

    runner.run(
        &CommandLine::new("git")
            .arg("clone")
            .arg("--depth=1")
            .arg(helper.repo_url)
            .arg(checkout.to_string_lossy()),
    )?;
    runner.run(
        &CommandLine::new("makepkg")
            .args(["-si", "--needed", "--noconfirm"])
            .dir(&checkout),
    )?;

    scratch
        .close()
        .context("removing scratch build directory")?;

    emit(
        Level::Success,
        "aur.bootstrap",
        &format!("Installed {}", helper.binary),
        None,
    );
    Ok(true)
}
