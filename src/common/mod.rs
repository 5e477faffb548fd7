pub mod config;
pub mod context;
pub mod error;
pub mod paths;
pub mod progress;
pub mod runner;
pub mod shell;
