//! Arch Linux mirror ranking.
//!
//! Downloads the country-filtered mirror list from archlinux.org, ranks it
//! with `rankmirrors` and swaps it in for `/etc/pacman.d/mirrorlist`.

use anyhow::{Context, Result, bail};
use reqwest::Url;

use super::{PackageManager, SetupOptions, sysfile};
use crate::common::progress::create_spinner;
use crate::common::runner::CommandLine;
use crate::ui::prelude::*;

pub const MIRROR_STATUS_URL: &str = "https://archlinux.org/mirrorlist/";

/// Mirror-status query for `country`, both protocols and IP versions.
pub fn mirrorlist_url(country: &str) -> Result<Url> {
    Url::parse_with_params(
        MIRROR_STATUS_URL,
        &[
            ("country", country),
            ("protocol", "http"),
            ("protocol", "https"),
            ("ip_version", "4"),
            ("ip_version", "6"),
            ("use_mirror_status", "on"),
        ],
    )
    .with_context(|| format!("building mirror list URL for '{}'", country))
}

/// Enable the commented-out `#Server` entries and drop every other comment.
pub fn filter_mirrorlist(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with("#Server") {
                line.trim_start_matches('#')
            } else {
                line
            }
        })
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn server_count(text: &str) -> usize {
    text.lines()
        .filter(|line| line.trim_start().starts_with("Server"))
        .count()
}

pub fn fetch_mirrorlist(country: &str) -> Result<String> {
    let url = mirrorlist_url(country)?;
    let pb = create_spinner(format!("Fetching mirror list for {}...", country));
    let result = reqwest::blocking::get(url.clone())
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .with_context(|| format!("fetching {}", url));
    pb.finish_and_clear();
    result
}

/// Back up, fetch, rank and replace the mirror list.
pub fn rank_mirrors(mgr: &PackageManager<'_>, options: &SetupOptions) -> Result<()> {
    rank_with(mgr, options, fetch_mirrorlist)
}

fn rank_with<F>(mgr: &PackageManager<'_>, options: &SetupOptions, fetch: F) -> Result<()>
where
    F: FnOnce(&str) -> Result<String>,
{
    emit(Level::Info, "mirrors.rank", "Ranking mirrors", None);
    let runner = mgr.runner();
    let mirrorlist = &mgr.files().mirrorlist;

    let backup = sysfile::backup(runner, mirrorlist)?;
    emit(
        Level::Debug,
        "mirrors.backup",
        &format!("Backed up mirror list to {}", backup.display()),
        None,
    );

    let rank = CommandLine::new("rankmirrors")
        .arg("-n")
        .arg(options.mirror_count.to_string())
        .arg("-");

    if runner.is_dry_run() {
        let url = mirrorlist_url(&options.mirror_country)?;
        emit(
            Level::Info,
            "mirrors.fetch",
            &format!("[DRY RUN] GET {}", url),
            None,
        );
        runner.run_with_input(&rank, "")?;
        sysfile::replace_atomically(runner, mirrorlist, "")?;
        return Ok(());
    }

    let candidates = filter_mirrorlist(&fetch(&options.mirror_country)?);
    if server_count(&candidates) == 0 {
        bail!("no mirrors listed for country '{}'", options.mirror_country);
    }

    let ranked = runner.run_with_input(&rank, &candidates)?;
    // An empty ranking would leave pacman without servers
    let servers = server_count(&ranked);
    if servers == 0 {
        bail!("rankmirrors returned no servers, keeping the current mirror list");
    }

    sysfile::replace_atomically(runner, mirrorlist, &ranked)?;
    emit(
        Level::Success,
        "mirrors.rank",
        &format!("Wrote {} ranked mirrors to {}", servers, mirrorlist.display()),
        Some(serde_json::json!({ "servers": servers })),
    );
    Ok(())
}
