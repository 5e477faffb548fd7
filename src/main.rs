mod common;
mod pkgmgr;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;

use crate::common::config::{EdenConfig, SetupOverrides};
use crate::common::context::Context;
use crate::common::paths;
use crate::common::runner::{CommandRunner, SystemRunner};
use crate::pkgmgr::{PackageManager, PackageManagerKind};
use crate::ui::prelude::*;

/// Eden - detect the host and provision build prerequisites and packages
#[derive(Parser, Debug)]
#[command(name = "eden", author, version, about, long_about = None)]
struct Cli {
    /// Show debug output, including every command run
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print commands that would change the system instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the detected operating system and privileges
    Info,

    /// Bootstrap the package manager and base build toolchain
    Setup {
        /// Package manager to use instead of the OS default
        #[arg(short, long, value_enum)]
        manager: Option<PackageManagerKind>,
        /// Rank Arch Linux mirrors by speed
        #[arg(long)]
        rank_mirrors: bool,
        /// Country code for mirror selection (overrides $COUNTRY)
        #[arg(long)]
        country: Option<String>,
        /// Number of ranked mirrors to keep
        #[arg(long)]
        mirror_count: Option<u32>,
    },

    /// Install packages
    Install {
        /// Package manager to use instead of the OS default
        #[arg(short, long, value_enum)]
        manager: Option<PackageManagerKind>,
        /// Packages to install, in order
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Upgrade all installed packages
    Upgrade {
        /// Package manager to use instead of the OS default
        #[arg(short, long, value_enum)]
        manager: Option<PackageManagerKind>,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.format, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(e) = run(cli) {
        emit(Level::Error, "error", &format!("Error: {:#}", e), None);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let runner = SystemRunner::new(cli.dry_run);

    match cli.command {
        Commands::Info => {
            let ctx = Context::detect(&runner)?;
            let manager = PackageManagerKind::for_os(ctx.os_type(), None)
                .map(|kind| kind.name())
                .unwrap_or("none");
            // Text mode already printed one line per field
            if matches!(get_output_format(), OutputFormat::Json) {
                emit(
                    Level::Info,
                    "info.context",
                    &format!("{} {}", ctx.os_type(), ctx.arch()),
                    Some(serde_json::json!(ctx)),
                );
            }
            emit(
                Level::Info,
                "info.manager",
                &format!("Package manager: {}", manager),
                Some(serde_json::json!(manager)),
            );
            Ok(())
        }
        Commands::Setup {
            manager,
            rank_mirrors,
            country,
            mirror_count,
        } => {
            let config = EdenConfig::load()?;
            let ctx = Context::detect(&runner)?;
            let mgr = build_manager(&ctx, &runner, &config, manager)?;
            let options = config.setup_options(&SetupOverrides {
                rank_mirrors,
                country,
                mirror_count,
            });
            mgr.setup_pkgmgr(&options)
        }
        Commands::Install { manager, packages } => {
            let config = EdenConfig::load()?;
            let ctx = Context::detect(&runner)?;
            let mgr = build_manager(&ctx, &runner, &config, manager)?;
            mgr.install_package(&packages)?;
            emit(
                Level::Success,
                "install.done",
                &format!("Installed {}", packages.join(" ")),
                None,
            );
            Ok(())
        }
        Commands::Upgrade { manager } => {
            let config = EdenConfig::load()?;
            let ctx = Context::detect(&runner)?;
            let mgr = build_manager(&ctx, &runner, &config, manager)?;
            mgr.upgrade_system()
        }
        Commands::Config { command } => handle_config(command),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "eden", &mut io::stdout());
            Ok(())
        }
    }
}

/// An explicit `--manager` wins; the configured one only applies where it fits the OS.
fn build_manager<'a>(
    ctx: &'a Context,
    runner: &'a dyn CommandRunner,
    config: &EdenConfig,
    explicit: Option<PackageManagerKind>,
) -> Result<PackageManager<'a>> {
    let preferred = explicit.or_else(|| {
        config
            .manager
            .filter(|kind| kind.supports(ctx.os_type()))
    });
    let mgr = PackageManager::for_context(ctx, runner, preferred)?;
    emit(
        Level::Debug,
        "pkgmgr.selected",
        &format!("Using {}", mgr.kind()),
        None,
    );

    Ok(match &config.flags {
        Some(flags) => mgr.with_flags(flags.clone()),
        None => mgr,
    })
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    let path = paths::config_file_path()?;
    match command {
        ConfigCommands::Show => {
            let config = EdenConfig::load_from(&path)?;
            match get_output_format() {
                OutputFormat::Json => println!("{}", serde_json::to_string(&config)?),
                OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            EdenConfig::default()
                .save_to(&path)
                .context("writing default configuration")?;
            emit(
                Level::Success,
                "config.init",
                &format!("Wrote {}", path.display()),
                None,
            );
        }
    }
    Ok(())
}
