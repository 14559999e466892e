use crate::{
    bootstrap::{BootstrapOutcome, BootstrapProgress, Bootstrapper},
    browser::PlatformOpener,
    config::BootstrapSettings,
};
use anyhow::{anyhow, Result};
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use tokio::runtime::{Builder, Runtime};

pub const APP_NAME: &str = "byze-bootstrap";

/// Shared HTTP client for the prober and the downloader.
pub fn make_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!(
            "ByzeBootstrap/{} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_NAME")
        ))
        .tcp_nodelay(true)
        .build()
        .map_err(|err| anyhow!("failed to construct HTTP client: {err}"))
}

pub struct BootstrapApp {
    runtime: Arc<Runtime>,
    settings: BootstrapSettings,
}

impl BootstrapApp {
    pub fn new(settings: BootstrapSettings) -> Result<Self> {
        let runtime = Arc::new(
            Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| anyhow!("failed to create Tokio runtime: {err}"))?,
        );
        Ok(Self { runtime, settings })
    }

    /// Runs the whole workflow on the app runtime and blocks until it ends.
    pub fn run<F>(self, config_file: PathBuf, on_progress: F) -> Result<BootstrapOutcome>
    where
        F: Fn(BootstrapProgress) + Send + Sync,
    {
        let bootstrapper = Bootstrapper::new(self.settings, PlatformOpener::current())?;
        let outcome = self
            .runtime
            .block_on(async { bootstrapper.run(&config_file, on_progress).await });
        Ok(outcome)
    }
}
