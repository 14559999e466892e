//! Bootstrap for the Byze local service.
//!
//! Checks whether the service is already answering on its local port and, if
//! not, asks the user through a browser page before downloading, starting it
//! and importing a `.byze` configuration file.

pub mod app;
pub mod bootstrap;
pub mod browser;
pub mod config;
pub mod consent;
pub mod download;
pub mod env_flags;
pub mod probe;
pub mod prompt;
pub mod service;

pub use bootstrap::{BootstrapOutcome, BootstrapProgress, Bootstrapper};
pub use browser::{PlatformOpener, UrlOpener};
pub use config::{resolve_config_file, BootstrapSettings, SettingsStore};
pub use consent::UserDecision;
