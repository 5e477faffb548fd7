//! User configuration.
//!
//! Values come from `~/.config/eden/config.toml`, then the `COUNTRY`
//! environment variable, then command-line flags, later sources winning.
//! Every field has a serde default so a partial (or missing) file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::common::paths;
use crate::pkgmgr::{PackageManagerKind, SetupOptions};

pub const COUNTRY_ENV: &str = "COUNTRY";
pub const DEFAULT_COUNTRY: &str = "US";
pub const DEFAULT_MIRROR_COUNT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdenConfig {
    /// Rank Arch mirrors by speed during setup
    pub rank_mirrors: bool,
    /// Country code used to filter the mirror list
    pub mirror_country: String,
    /// Number of ranked mirrors to keep
    pub mirror_count: u32,
    /// Preferred Arch Linux package manager (pacman, yay, paru)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<PackageManagerKind>,
    /// Flags passed to every install, replacing the manager's defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,
}

impl Default for EdenConfig {
    fn default() -> Self {
        Self {
            rank_mirrors: false,
            mirror_country: DEFAULT_COUNTRY.to_string(),
            mirror_count: DEFAULT_MIRROR_COUNT,
            manager: None,
            flags: None,
        }
    }
}

/// Setup-related values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SetupOverrides {
    pub rank_mirrors: bool,
    pub country: Option<String>,
    pub mirror_count: Option<u32>,
}

impl EdenConfig {
    /// Load the user's config, falling back to defaults if there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let body = toml::to_string_pretty(self).context("serializing config")?;
        let output = format!(
            "# eden configuration\n# Optional keys: manager = \"pacman\" | \"yay\" | \"paru\", flags = [\"--noconfirm\"]\n{}",
            body
        );
        fs::write(path, output).with_context(|| format!("writing config to {}", path.display()))
    }

    /// Combine config, environment and command line into setup options.
    pub fn setup_options(&self, overrides: &SetupOverrides) -> SetupOptions {
        let env_country = std::env::var(COUNTRY_ENV).ok();
        self.resolve_setup_options(overrides, env_country.as_deref())
    }

    fn resolve_setup_options(
        &self,
        overrides: &SetupOverrides,
        env_country: Option<&str>,
    ) -> SetupOptions {
        let mirror_country = overrides
            .country
            .as_deref()
            .or(env_country.filter(|c| !c.trim().is_empty()))
            .unwrap_or(&self.mirror_country)
            .trim()
            .to_uppercase();

        SetupOptions {
            rank_mirrors: overrides.rank_mirrors || self.rank_mirrors,
            mirror_country,
            mirror_count: overrides.mirror_count.unwrap_or(self.mirror_count),
        }
    }
}
