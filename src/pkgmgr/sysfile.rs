//! Edits to root-owned system files.
//!
//! Reads go straight to the filesystem. Writes go through `sudo` commands on
//! the [`CommandRunner`] so they are covered by dry-run mode and by the same
//! error reporting as every other external command.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::common::runner::{CommandLine, CommandRunner};
use crate::ui::prelude::*;

pub const MAKEPKG_CONF: &str = "/etc/makepkg.conf";
pub const MIRRORLIST: &str = "/etc/pacman.d/mirrorlist";

/// Locations of the system files edited during setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemFiles {
    pub makepkg_conf: PathBuf,
    pub mirrorlist: PathBuf,
}

impl Default for SystemFiles {
    fn default() -> Self {
        Self {
            makepkg_conf: PathBuf::from(MAKEPKG_CONF),
            mirrorlist: PathBuf::from(MIRRORLIST),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Sibling path with `suffix` appended to the file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// File contents, or an empty string if the file does not exist.
pub fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Append `line` to `path` with `tee -a`, under sudo unless `as_root`.
pub fn append_line(
    runner: &dyn CommandRunner,
    path: &Path,
    line: &str,
    as_root: bool,
) -> Result<()> {
    let existing = read_or_empty(path)?;
    let mut input = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        input.push('\n');
    }
    input.push_str(line);
    input.push('\n');

    runner.run_with_input(
        &CommandLine::privileged("tee", as_root)
            .arg("-a")
            .arg(path_arg(path)),
        &input,
    )?;
    Ok(())
}

/// Copy `path` to `<path>.bak` and return the backup location.
pub fn backup(runner: &dyn CommandRunner, path: &Path) -> Result<PathBuf> {
    let target = with_suffix(path, ".bak");
    runner.run(
        &CommandLine::sudo("cp")
            .arg("-f")
            .arg(path_arg(path))
            .arg(path_arg(&target)),
    )?;
    Ok(target)
}

/// Replace `path` with `contents`. The new contents are written to a
/// sibling file first and renamed over the original, so readers never see a
/// partial file. A failed rename removes the staging file.
pub fn replace_atomically(runner: &dyn CommandRunner, path: &Path, contents: &str) -> Result<()> {
    let staging = with_suffix(path, ".eden-new");
    runner.run_with_input(&CommandLine::sudo("tee").arg(path_arg(&staging)), contents)?;
    let renamed = runner.run(
        &CommandLine::sudo("mv")
            .arg("-f")
            .arg(path_arg(&staging))
            .arg(path_arg(path)),
    );
    if renamed.is_err() {
        let cleanup = CommandLine::sudo("rm").arg("-f").arg(path_arg(&staging));
        if let Err(e) = runner.run(&cleanup) {
            emit(
                Level::Warn,
                "sysfile.cleanup",
                &format!("Could not remove {}: {:#}", staging.display(), e),
                None,
            );
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::runner::testing::RecordingRunner;
    use tempfile::tempdir;

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("/etc/pacman.d/mirrorlist"), ".bak"),
            PathBuf::from("/etc/pacman.d/mirrorlist.bak")
        );
    }

    #[test]
    fn test_append_line_adds_missing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("makepkg.conf");
        fs::write(&path, "CFLAGS=\"-O2\"").unwrap();

        let runner = RecordingRunner::new();
        append_line(&runner, &path, "MAKEFLAGS=x", false).unwrap();

        assert_eq!(runner.inputs.borrow().as_slice(), ["\nMAKEFLAGS=x\n"]);
        assert_eq!(
            runner.rendered(),
            vec![format!("sudo tee -a {}", path.display())]
        );
    }

    #[test]
    fn test_append_line_as_root_skips_sudo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("makepkg.conf");

        let runner = RecordingRunner::new();
        append_line(&runner, &path, "MAKEFLAGS=x", true).unwrap();

        assert_eq!(runner.inputs.borrow().as_slice(), ["MAKEFLAGS=x\n"]);
        assert_eq!(runner.rendered(), vec![format!("tee -a {}", path.display())]);
    }

    #[test]
    fn test_read_or_empty_missing_file() {
        let dir = tempdir().unwrap();
        assert_eq!(read_or_empty(&dir.path().join("nope")).unwrap(), "");
    }

    #[test]
    fn test_replace_atomically_stages_then_renames() {
        let runner = RecordingRunner::new();
        replace_atomically(&runner, Path::new("/etc/pacman.d/mirrorlist"), "Server = a\n").unwrap();
        assert_eq!(
            runner.rendered(),
            vec![
                "sudo tee /etc/pacman.d/mirrorlist.eden-new",
                "sudo mv -f /etc/pacman.d/mirrorlist.eden-new /etc/pacman.d/mirrorlist",
            ]
        );
        assert_eq!(runner.inputs.borrow().as_slice(), ["Server = a\n"]);
    }

    #[test]
    fn test_replace_atomically_stops_when_staging_fails() {
        let runner = RecordingRunner::new().fail_on("sudo tee");
        assert!(replace_atomically(&runner, Path::new("/etc/pacman.d/mirrorlist"), "x").is_err());
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_failed_rename_removes_staging_file() {
        let runner = RecordingRunner::new().fail_on("sudo mv");
        let err = replace_atomically(&runner, Path::new("/etc/pacman.d/mirrorlist"), "x")
            .unwrap_err();
        assert!(err.to_string().contains("sudo mv"));
        assert_eq!(
            runner.rendered(),
            vec![
                "sudo tee /etc/pacman.d/mirrorlist.eden-new",
                "sudo mv -f /etc/pacman.d/mirrorlist.eden-new /etc/pacman.d/mirrorlist",
                "sudo rm -f /etc/pacman.d/mirrorlist.eden-new",
            ]
        );
    }
}
