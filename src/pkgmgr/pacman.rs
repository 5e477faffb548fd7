use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use super::{PackageManager, SetupOptions, mirrors, sysfile};
use crate::common::runner::CommandLine;
use crate::ui::prelude::*;

/// Parallel compilation with one job per core.
pub const MAKEFLAGS_LINE: &str = r#"MAKEFLAGS="-j$(nproc)""#;

const BASE_PACKAGES: &[&str] = &["base-devel", "git", "pacman-contrib"];

static MAKEFLAGS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^MAKEFLAGS="-j\$\(nproc\)""#).expect("MAKEFLAGS pattern is valid")
});

fn has_makeflags(content: &str) -> bool {
    MAKEFLAGS_PATTERN.is_match(content)
}

/// Append the MAKEFLAGS line to makepkg.conf unless it is already there.
/// Returns whether the file was changed.
fn ensure_makeflags(mgr: &PackageManager<'_>) -> Result<bool> {
    let path = &mgr.files().makepkg_conf;
    let content = sysfile::read_or_empty(path)?;
    if has_makeflags(&content) {
        emit(
            Level::Debug,
            "pacman.makeflags",
            &format!("MAKEFLAGS already set in {}", path.display()),
            None,
        );
        return Ok(false);
    }

    emit(
        Level::Info,
        "pacman.makeflags",
        &format!("Setting MAKEFLAGS in {}", path.display()),
        None,
    );
    sysfile::append_line(
        mgr.runner(),
        path,
        MAKEFLAGS_LINE,
        mgr.context().root_privileges(),
    )?;
    Ok(true)
}

/// Shared Arch Linux bootstrap used by every Arch-family manager.
pub(super) fn setup(mgr: &PackageManager<'_>, options: &SetupOptions) -> Result<()> {
    emit(Level::Info, "pacman.setup", "Setting up pacman", None);
    let runner = mgr.runner();

    ensure_makeflags(mgr)?;

    runner.run(&CommandLine::sudo("pacman").arg("-Sy"))?;
    runner.run(
        &CommandLine::sudo("pacman")
            .arg("-S")
            .args(mgr.flags().iter().cloned())
            .args(BASE_PACKAGES.iter().copied()),
    )?;

    if options.rank_mirrors {
        // Ranking only speeds up downloads; a failure must not abort setup
        if let Err(e) = mirrors::rank_mirrors(mgr, options) {
            emit(
                Level::Warn,
                "pacman.mirrors",
                &format!("Mirror ranking skipped: {:#}", e),
                None,
            );
        }
    }

    emit(Level::Success, "pacman.setup", "pacman is ready", None);
    Ok(())
}

pub(super) fn upgrade(mgr: &PackageManager<'_>) -> Result<()> {
    mgr.runner()
        .run(&CommandLine::sudo("pacman").arg("-Su").arg("--noconfirm"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::context::{Context, OsType};
    use crate::common::runner::testing::RecordingRunner;
    use crate::pkgmgr::{PackageManagerKind, SystemFiles};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn files_in(dir: &TempDir, makepkg: &str) -> SystemFiles {
        let makepkg_conf = dir.path().join("makepkg.conf");
        fs::write(&makepkg_conf, makepkg).unwrap();
        SystemFiles {
            makepkg_conf,
            mirrorlist: dir.path().join("mirrorlist"),
        }
    }

    fn ctx() -> Context {
        Context::new(OsType::ArchLinux, "#1 SMP", true, false, "64bit")
    }

    #[test]
    fn test_has_makeflags() {
        assert!(has_makeflags("CFLAGS=x\nMAKEFLAGS=\"-j$(nproc)\"\n"));
        assert!(!has_makeflags("#MAKEFLAGS=\"-j$(nproc)\"\n"));
        assert!(!has_makeflags("MAKEFLAGS=\"-j2\"\n"));
        assert!(!has_makeflags(""));
    }

    #[test]
    fn test_setup_runs_base_steps_in_order() {
        let dir = tempdir().unwrap();
        let files = files_in(&dir, "CFLAGS=\"-O2\"\n");
        let ctx = ctx();
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_files(files.clone());

        pacman.setup_pkgmgr(&SetupOptions::default()).unwrap();

        assert_eq!(
            runner.rendered(),
            vec![
                format!("sudo tee -a {}", files.makepkg_conf.display()),
                "sudo pacman -Sy".to_string(),
                "sudo pacman -S --noconfirm --assume-installed base-devel git pacman-contrib"
                    .to_string(),
            ]
        );
        assert_eq!(
            runner.inputs.borrow().as_slice(),
            [format!("{}\n", MAKEFLAGS_LINE)]
        );
    }

    #[test]
    fn test_setup_as_root_appends_without_sudo() {
        let dir = tempdir().unwrap();
        let files = files_in(&dir, "CFLAGS=\"-O2\"\n");
        let ctx = Context::new(OsType::ArchLinux, "#1 SMP", true, true, "64bit");
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_files(files.clone());

        pacman.setup_pkgmgr(&SetupOptions::default()).unwrap();

        assert_eq!(
            runner.rendered()[0],
            format!("tee -a {}", files.makepkg_conf.display())
        );
    }

    #[test]
    fn test_setup_does_not_duplicate_makeflags() {
        let dir = tempdir().unwrap();
        let files = files_in(&dir, &format!("CFLAGS=\"-O2\"\n{}\n", MAKEFLAGS_LINE));
        let ctx = ctx();
        let runner = RecordingRunner::new();
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_files(files);

        pacman.setup_pkgmgr(&SetupOptions::default()).unwrap();

        assert!(runner.rendered().iter().all(|c| !c.contains("tee")));
        assert!(runner.inputs.borrow().is_empty());
    }

    #[test]
    fn test_setup_stops_on_failed_refresh() {
        let dir = tempdir().unwrap();
        let files = files_in(&dir, MAKEFLAGS_LINE);
        let ctx = ctx();
        let runner = RecordingRunner::new().fail_on("sudo pacman -Sy");
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_files(files);

        assert!(pacman.setup_pkgmgr(&SetupOptions::default()).is_err());
        assert_eq!(runner.rendered(), vec!["sudo pacman -Sy"]);
    }

    #[test]
    fn test_failed_mirror_ranking_does_not_abort_setup() {
        let dir = tempdir().unwrap();
        let files = files_in(&dir, MAKEFLAGS_LINE);
        let ctx = ctx();
        // The backup is the first ranking step; make it fail
        let runner = RecordingRunner::new().fail_on("sudo cp");
        let pacman = PackageManager::new(PackageManagerKind::Pacman, &ctx, &runner)
            .unwrap()
            .with_files(files);

        let options = SetupOptions {
            rank_mirrors: true,
            ..Default::default()
        };
        pacman.setup_pkgmgr(&options).unwrap();

        let rendered = runner.rendered();
        assert!(rendered.iter().any(|c| c.starts_with("sudo cp")));
        assert!(rendered.iter().all(|c| !c.starts_with("sudo mv")));
    }
}
