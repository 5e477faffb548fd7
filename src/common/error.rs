use thiserror::Error;

use crate::common::context::OsType;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Windows is not supported")]
    WindowsUnsupported,

    #[error("Unsupported platform: {system}")]
    UnsupportedPlatform { system: String },

    #[error("{manager} requires sudo permissions")]
    MissingPrivilege { manager: &'static str },

    #[error("No packages given to install")]
    EmptyPackageList,

    #[error("Invalid package name: '{0}'")]
    InvalidPackageName(String),

    #[error("Command `{command}` failed with {status}")]
    CommandFailed { command: String, status: String },

    #[error("No supported package manager for {0}")]
    NoPackageManager(OsType),

    #[error("{manager} cannot manage packages on {os}")]
    ManagerMismatch { manager: &'static str, os: OsType },

    #[error("Refusing to build {helper} as root (makepkg must run as a regular user)")]
    BuildAsRoot { helper: &'static str },
}

impl ProvisionError {
    pub fn command_failed(command: impl Into<String>, code: Option<i32>) -> Self {
        let status = match code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        };
        ProvisionError::CommandFailed {
            command: command.into(),
            status,
        }
    }
}
