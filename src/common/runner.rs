//! External command execution.
//!
//! Every package-manager action is a [`CommandLine`] with a fixed argument
//! vector handed to a [`CommandRunner`]. [`SystemRunner`] spawns real
//! processes through `duct`; tests swap in a recording runner.

use anyhow::{Context, Result};
use duct::cmd;
use std::fmt;
use std::path::PathBuf;
use std::process::Output;

use crate::common::error::ProvisionError;
use crate::common::shell::shell_quote;
use crate::ui::prelude::*;

/// A program plus its argument vector and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// `sudo <program>`
    pub fn sudo(program: impl Into<String>) -> Self {
        Self::new("sudo").arg(program)
    }

    /// `<program>` when already root, `sudo <program>` otherwise.
    pub fn privileged(program: impl Into<String>, as_root: bool) -> Self {
        if as_root {
            Self::new(program)
        } else {
            Self::sudo(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn expression(&self) -> duct::Expression {
        let expr = cmd(&self.program, &self.args);
        match &self.cwd {
            Some(cwd) => expr.dir(cwd),
            None => expr,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

pub trait CommandRunner {
    /// Run with inherited stdio. Non-zero exit is an error.
    fn run(&self, command: &CommandLine) -> Result<()>;

    /// Run and report whether the command exited with status 0.
    fn probe(&self, command: &CommandLine) -> bool;

    /// Feed `input` on stdin and capture stdout. Non-zero exit is an error.
    fn run_with_input(&self, command: &CommandLine, input: &str) -> Result<String>;

    /// Capture stdout of a read-only query. Runs even in dry-run mode.
    /// Non-zero exit is an error.
    fn inspect(&self, command: &CommandLine) -> Result<String>;

    /// Whether mutating commands are only printed.
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Look a program up on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Runs commands on the host. With `dry_run` set, mutating commands are
/// printed instead of executed; probes and lookups still run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    pub dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn print_dry_run(&self, command: &CommandLine, input: Option<&str>) {
        let mut message = format!("[DRY RUN] {}", command);
        if let Some(cwd) = &command.cwd {
            message.push_str(&format!("  (in {})", cwd.display()));
        }
        emit(Level::Info, "runner.dry_run", &message, None);
        if let Some(input) = input {
            emit(
                Level::Debug,
                "runner.dry_run.stdin",
                &format!("[DRY RUN] stdin: {} bytes", input.len()),
                None,
            );
        }
    }

    fn log_spawn(command: &CommandLine) {
        emit(
            Level::Debug,
            "runner.spawn",
            &format!("$ {}", command),
            None,
        );
    }
}

fn check_output(command: &CommandLine, output: Output) -> Result<Output> {
    if !output.status.success() {
        return Err(ProvisionError::command_failed(command.to_string(), output.status.code()).into());
    }
    Ok(output)
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandLine) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(());
        }
        Self::log_spawn(command);
        let output = command
            .expression()
            .unchecked()
            .run()
            .with_context(|| format!("Failed to execute `{}`", command))?;
        check_output(command, output)?;
        Ok(())
    }

    fn probe(&self, command: &CommandLine) -> bool {
        Self::log_spawn(command);
        command
            .expression()
            .stdout_null()
            .unchecked()
            .run()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn inspect(&self, command: &CommandLine) -> Result<String> {
        Self::log_spawn(command);
        let output = command
            .expression()
            .stdout_capture()
            .unchecked()
            .run()
            .with_context(|| format!("Failed to execute `{}`", command))?;
        let output = check_output(command, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_with_input(&self, command: &CommandLine, input: &str) -> Result<String> {
        if self.dry_run {
            self.print_dry_run(command, Some(input));
            return Ok(String::new());
        }
        Self::log_spawn(command);
        let output = command
            .expression()
            .stdin_bytes(input.as_bytes().to_vec())
            .stdout_capture()
            .unchecked()
            .run()
            .with_context(|| format!("Failed to execute `{}`", command))?;
        let output = check_output(command, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
