use anyhow::Result;

use super::{PackageManager, SetupOptions};
use crate::common::runner::CommandLine;
use crate::ui::prelude::*;

const BASE_PACKAGES: &[&str] = &["build-essential", "git"];

pub(super) fn setup(mgr: &PackageManager<'_>, options: &SetupOptions) -> Result<()> {
    emit(Level::Info, "apt.setup", "Setting up apt", None);
    let runner = mgr.runner();

    runner.run(&CommandLine::sudo("apt-get").arg("update"))?;
    runner.run(
        &CommandLine::sudo("apt-get")
            .arg("install")
            .args(mgr.flags().iter().cloned())
            .args(BASE_PACKAGES.iter().copied()),
    )?;

    if options.rank_mirrors {
        emit(
            Level::Warn,
            "apt.mirrors",
            "Mirror ranking is only available on Arch Linux, skipping",
            None,
        );
    }

    emit(Level::Success, "apt.setup", "apt is ready", None);
    Ok(())
}

pub(super) fn upgrade(mgr: &PackageManager<'_>) -> Result<()> {
    mgr.runner()
        .run(&CommandLine::sudo("apt-get").arg("upgrade").arg("-y"))
}
