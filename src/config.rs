use crate::{app::APP_NAME, env_flags};
use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_SERVICE_URL: &str = "http://localhost:16688/";
const DEFAULT_DOWNLOAD_URL: &str = "http://120.232.136.73:31619/byzedev/byze.exe";
const DEFAULT_PROMPT_PORT: u16 = 5000;
const INSTALL_FOLDER: &str = "Byze";
const CONFIG_FILE_NAME: &str = ".byze";

/// Tunables for one bootstrap run.
///
/// Every field has a default so a settings file only needs the keys it
/// overrides.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapSettings {
    pub service_url: String,
    pub probe_timeout_secs: u64,
    pub prompt_bind: SocketAddr,
    pub prompt_host: String,
    pub download_url: String,
    pub install_dir: Option<PathBuf>,
    pub binary_name: String,
    pub expected_sha256: Option<String>,
    pub consent_timeout_secs: u64,
    pub startup_delay_ms: u64,
    pub verify_startup: bool,
    pub startup_probe_attempts: u32,
    pub reuse_existing_binary: bool,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            probe_timeout_secs: 3,
            prompt_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PROMPT_PORT)),
            prompt_host: "localhost".to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            install_dir: None,
            binary_name: default_binary_name(),
            expected_sha256: None,
            consent_timeout_secs: 300,
            startup_delay_ms: 3000,
            verify_startup: false,
            startup_probe_attempts: 5,
            reuse_existing_binary: false,
        }
    }
}

impl BootstrapSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Directory the service binary is downloaded into.
    pub fn resolved_install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.install_dir {
            return Ok(dir.clone());
        }
        let base = BaseDirs::new()
            .ok_or_else(|| anyhow!("unable to resolve the home directory for {APP_NAME}"))?;
        Ok(base.home_dir().join(INSTALL_FOLDER))
    }

    pub fn binary_path(&self) -> Result<PathBuf> {
        Ok(self.resolved_install_dir()?.join(&self.binary_name))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_flags::service_url() {
            self.service_url = url;
        }
        if let Some(url) = env_flags::download_url() {
            self.download_url = url;
        }
        if let Some(dir) = env_flags::install_dir() {
            self.install_dir = Some(dir);
        }
        if let Some(digest) = env_flags::expected_sha256() {
            self.expected_sha256 = Some(digest);
        }
        if let Some(port) = env_flags::prompt_port() {
            self.prompt_bind.set_port(port);
        }
        if let Some(secs) = env_flags::consent_timeout_secs() {
            self.consent_timeout_secs = secs;
        }
        if let Some(verify) = env_flags::verify_startup() {
            self.verify_startup = verify;
        }
        if let Some(reuse) = env_flags::reuse_existing_binary() {
            self.reuse_existing_binary = reuse;
        }
    }
}

/// Loads [`BootstrapSettings`] from defaults, a JSON file and the environment.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Uses `explicit` when given; it must then exist. Otherwise falls back to
    /// the per-user settings file, which is optional.
    pub fn new(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(anyhow!("settings file {path:?} does not exist"));
            }
            return Ok(Self { path: Some(path) });
        }

        let path = BaseDirs::new()
            .map(|base| base.config_dir().join(APP_NAME).join(SETTINGS_FILE))
            .filter(|path| path.is_file());
        Ok(Self { path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<BootstrapSettings> {
        let mut settings = match &self.path {
            Some(path) => read_settings(path)?,
            None => BootstrapSettings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }
}

fn read_settings(path: &Path) -> Result<BootstrapSettings> {
    let data = fs::read(path).with_context(|| format!("failed to read settings file {path:?}"))?;
    serde_json::from_slice(&data).with_context(|| format!("failed to parse settings from {path:?}"))
}

/// The file handed to `import`: the caller's choice, else `.byze` in the
/// working directory.
pub fn resolve_config_file(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|cwd| cwd.join(CONFIG_FILE_NAME))
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME))
    })
}

fn default_binary_name() -> String {
    format!("byze{}", std::env::consts::EXE_SUFFIX)
}
