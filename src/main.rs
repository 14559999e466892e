use anyhow::Result;
use byze_bootstrap::{
    app::BootstrapApp, resolve_config_file, BootstrapProgress, SettingsStore, UserDecision,
};
use clap::Parser;
use env_logger::Env;
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(author, version, about = "Make sure Byze is running, then import a .byze file", long_about = None)]
struct Opt {
    /// Configuration file to import (defaults to ./.byze)
    file: Option<PathBuf>,
    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Where to download the service binary from
    #[arg(long)]
    download_url: Option<String>,
    /// Directory the service binary is installed into
    #[arg(long)]
    install_dir: Option<PathBuf>,
    /// Seconds to wait for an answer on the install prompt
    #[arg(long)]
    consent_timeout: Option<u64>,
    /// Require a healthy service after starting it
    #[arg(long)]
    verify_startup: bool,
    /// Skip the download when the binary is already installed
    #[arg(long)]
    reuse_existing: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let opts = Opt::parse();
    let default_filter = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let store = SettingsStore::new(opts.settings)?;
    if let Some(path) = store.path() {
        log::info!("Using settings from {path:?}");
    }
    let mut settings = store.load()?;
    if let Some(url) = opts.download_url {
        settings.download_url = url;
    }
    if let Some(dir) = opts.install_dir {
        settings.install_dir = Some(dir);
    }
    if let Some(secs) = opts.consent_timeout {
        settings.consent_timeout_secs = secs;
    }
    settings.verify_startup |= opts.verify_startup;
    settings.reuse_existing_binary |= opts.reuse_existing;

    let config_file = resolve_config_file(opts.file);
    let outcome = BootstrapApp::new(settings)?.run(config_file, report)?;
    if outcome.is_success() {
        println!("{outcome}");
    } else {
        eprintln!("{outcome}");
    }
    Ok(ExitCode::from(outcome.exit_code() as u8))
}

fn report(progress: BootstrapProgress) {
    match progress {
        BootstrapProgress::Checking { url } => log::debug!("Checking Byze at {url}"),
        BootstrapProgress::ServiceAvailable => {
            println!("Byze is already running; importing the .byze file...")
        }
        BootstrapProgress::ServiceUnavailable => {
            println!("Byze is not running; starting the install flow...")
        }
        BootstrapProgress::AwaitingConsent { url, timeout } => println!(
            "Waiting up to {}s for your answer at {url}",
            timeout.as_secs()
        ),
        BootstrapProgress::ConsentReceived(UserDecision::Granted) => {
            println!("Installation approved.")
        }
        BootstrapProgress::ConsentReceived(_) => {}
        BootstrapProgress::Downloading { url } => println!("Downloading Byze from {url}..."),
        BootstrapProgress::Downloaded { path, .. } => {
            println!("Byze saved to {}", path.display())
        }
        BootstrapProgress::Starting { .. } => println!("Starting the Byze service..."),
        BootstrapProgress::Importing { file } => println!("Importing {}...", file.display()),
    }
}
