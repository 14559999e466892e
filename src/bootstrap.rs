//! The install/confirm/launch/import workflow.
//!
//! A run probes the service first. If it answers, the configuration file is
//! imported straight away. Otherwise the user is asked for consent through a
//! local web page; on approval the binary is downloaded, started and the
//! file imported. Every failure ends the run with a [`BootstrapOutcome`];
//! nothing is retried.

use crate::{
    app::make_http_client,
    browser::UrlOpener,
    config::BootstrapSettings,
    consent::{decision_channel, UserDecision},
    download::{DownloadStatus, Downloader},
    probe::Prober,
    prompt::{ConfirmationServer, PromptError},
    service::{ServiceBinary, StartupCheck},
};
use anyhow::Result;
use log::{info, warn};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Milestones reported to the caller while a run progresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapProgress {
    Checking { url: String },
    ServiceAvailable,
    ServiceUnavailable,
    AwaitingConsent { url: String, timeout: Duration },
    ConsentReceived(UserDecision),
    Downloading { url: String },
    Downloaded { path: PathBuf, status: DownloadStatus },
    Starting { binary: PathBuf },
    Importing { file: PathBuf },
}

/// Terminal state of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Imported { file: PathBuf, installed: bool },
    ImportFailed { file: PathBuf, installed: bool, error: String },
    /// Explicit cancel, or no answer before the consent timeout.
    Refused { decision: UserDecision },
    PromptFailed { error: String },
    DownloadFailed { error: String },
    InstallFailed { error: String },
}

impl BootstrapOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BootstrapOutcome::Imported { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapOutcome::Imported { .. } => 0,
            BootstrapOutcome::ImportFailed { .. } => 1,
            BootstrapOutcome::Refused { .. } => 2,
            BootstrapOutcome::DownloadFailed { .. } => 3,
            BootstrapOutcome::InstallFailed { .. } => 4,
            BootstrapOutcome::PromptFailed { .. } => 5,
        }
    }
}

impl fmt::Display for BootstrapOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapOutcome::Imported { file, .. } => {
                write!(f, "Imported {}", file.display())
            }
            BootstrapOutcome::ImportFailed { file, error, .. } => {
                write!(f, "Import failed: {} ({error})", file.display())
            }
            BootstrapOutcome::Refused {
                decision: UserDecision::Unset,
            } => f.write_str("No answer to the install prompt in time; exiting."),
            BootstrapOutcome::Refused { .. } => f.write_str("Installation declined; exiting."),
            BootstrapOutcome::PromptFailed { error } => {
                write!(f, "Could not show the install prompt: {error}")
            }
            BootstrapOutcome::DownloadFailed { error } => {
                write!(f, "Byze download failed: {error}")
            }
            BootstrapOutcome::InstallFailed { error } => {
                write!(f, "Byze failed to start: {error}")
            }
        }
    }
}

pub struct Bootstrapper<O> {
    settings: BootstrapSettings,
    prober: Prober,
    downloader: Downloader,
    binary: ServiceBinary,
    opener: O,
}

impl<O: UrlOpener> Bootstrapper<O> {
    pub fn new(settings: BootstrapSettings, opener: O) -> Result<Self> {
        let client = make_http_client()?;
        let binary_path = settings.binary_path()?;
        let prober = Prober::new(
            client.clone(),
            settings.service_url.clone(),
            settings.probe_timeout(),
        );
        let downloader = Downloader::new(client, settings.download_url.clone(), &binary_path)
            .with_expected_sha256(settings.expected_sha256.clone())
            .reuse_existing(settings.reuse_existing_binary);

        Ok(Self {
            settings,
            prober,
            downloader,
            binary: ServiceBinary::new(binary_path),
            opener,
        })
    }

    pub async fn run<F>(&self, config_file: &Path, on_progress: F) -> BootstrapOutcome
    where
        F: Fn(BootstrapProgress) + Send + Sync,
    {
        on_progress(BootstrapProgress::Checking {
            url: self.prober.url().to_string(),
        });
        if self.prober.is_available().await {
            on_progress(BootstrapProgress::ServiceAvailable);
            return self.import(config_file, false, &on_progress).await;
        }
        on_progress(BootstrapProgress::ServiceUnavailable);

        let decision = match self.ask_consent(&on_progress).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!("{err}");
                return BootstrapOutcome::PromptFailed {
                    error: err.to_string(),
                };
            }
        };
        on_progress(BootstrapProgress::ConsentReceived(decision));
        if !decision.is_granted() {
            info!("install not permitted ({decision:?})");
            return BootstrapOutcome::Refused { decision };
        }

        on_progress(BootstrapProgress::Downloading {
            url: self.downloader.url().to_string(),
        });
        match self.downloader.fetch().await {
            Ok(outcome) => on_progress(BootstrapProgress::Downloaded {
                path: outcome.destination,
                status: outcome.status,
            }),
            Err(err) => {
                warn!("{err}");
                return BootstrapOutcome::DownloadFailed {
                    error: err.to_string(),
                };
            }
        }

        on_progress(BootstrapProgress::Starting {
            binary: self.binary.path().to_path_buf(),
        });
        let check = self.settings.verify_startup.then_some(StartupCheck {
            prober: &self.prober,
            attempts: self.settings.startup_probe_attempts,
        });
        if let Err(err) = self.binary.install(self.settings.startup_delay(), check).await {
            warn!("{err}");
            return BootstrapOutcome::InstallFailed {
                error: err.to_string(),
            };
        }

        self.import(config_file, true, &on_progress).await
    }

    /// Serves the prompt, points the browser at it and waits for an answer.
    async fn ask_consent<F>(&self, on_progress: &F) -> Result<UserDecision, PromptError>
    where
        F: Fn(BootstrapProgress) + Send + Sync,
    {
        let (sender, receiver) = decision_channel();
        let server = ConfirmationServer::bind(self.settings.prompt_bind, sender).await?;
        let url = server.prompt_url(&self.settings.prompt_host);
        // Detached: the server is abandoned when the process exits.
        let _ = server.spawn();

        let timeout = self.settings.consent_timeout();
        on_progress(BootstrapProgress::AwaitingConsent {
            url: url.clone(),
            timeout,
        });
        self.opener.open(&url);
        Ok(receiver.wait(timeout).await)
    }

    async fn import<F>(&self, file: &Path, installed: bool, on_progress: &F) -> BootstrapOutcome
    where
        F: Fn(BootstrapProgress) + Send + Sync,
    {
        on_progress(BootstrapProgress::Importing {
            file: file.to_path_buf(),
        });
        match self.binary.import(file).await {
            Ok(()) => {
                info!("imported {:?}", file);
                BootstrapOutcome::Imported {
                    file: file.to_path_buf(),
                    installed,
                }
            }
            Err(err) => {
                warn!("{err}");
                BootstrapOutcome::ImportFailed {
                    file: file.to_path_buf(),
                    installed,
                    error: err.to_string(),
                }
            }
        }
    }
}
