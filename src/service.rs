//! Drives the service binary through its command line: detached start and
//! synchronous import.

use crate::probe::Prober;
use log::{debug, info, warn};
use std::{
    io,
    path::{Path, PathBuf},
    process::{Child, ExitStatus, Stdio},
    thread,
    time::Duration,
};
use thiserror::Error;
use tokio::process::Command;

const STARTUP_PROBE_BASE: Duration = Duration::from_secs(1);

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to launch {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("service did not answer on {url} after {attempts} attempts")]
    NotReady { url: String, attempts: u32 },
    #[error("import of {file:?} exited with code {exit_code:?}")]
    ImportFailed {
        file: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Optional health confirmation after the startup delay.
#[derive(Clone, Copy, Debug)]
pub struct StartupCheck<'a> {
    pub prober: &'a Prober,
    pub attempts: u32,
}

/// The downloaded service executable.
#[derive(Clone, Debug)]
pub struct ServiceBinary {
    path: PathBuf,
}

impl ServiceBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts `server start -d` detached and waits `startup_delay` for it to
    /// bind. The exit status is never inspected; with `check` set the service
    /// must also pass a health probe afterwards.
    pub async fn install(
        &self,
        startup_delay: Duration,
        check: Option<StartupCheck<'_>>,
    ) -> Result<(), ServiceError> {
        let mut command = std::process::Command::new(&self.path);
        command
            .args(["server", "start", "-d"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);

        let child = command.spawn().map_err(|source| self.spawn_error(source))?;
        info!(
            "Started {:?} (pid {}); waiting {:?} for it to come up",
            self.path,
            child.id(),
            startup_delay
        );
        reap_in_background(child);
        tokio::time::sleep(startup_delay).await;

        if let Some(check) = check {
            if !check
                .prober
                .wait_until_available(check.attempts, STARTUP_PROBE_BASE)
                .await
            {
                return Err(ServiceError::NotReady {
                    url: check.prober.url().to_string(),
                    attempts: check.attempts,
                });
            }
            info!("Service is answering on {}", check.prober.url());
        }
        Ok(())
    }

    /// Runs `import --file <file>` to completion. Succeeds iff the exit code is 0.
    pub async fn import(&self, file: &Path) -> Result<(), ServiceError> {
        let mut command = Command::new(&self.path);
        command
            .arg("import")
            .arg("--file")
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        hide_window(&mut command);

        let output = command
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            debug!("import stdout: {}", stdout.trim());
            debug!("import stderr: {}", stderr.trim());
            return Ok(());
        }

        warn!("import stdout: {}", stdout.trim());
        warn!("import stderr: {}", stderr.trim());
        Err(ServiceError::ImportFailed {
            file: file.to_path_buf(),
            exit_code: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }

    fn spawn_error(&self, source: io::Error) -> ServiceError {
        ServiceError::Spawn {
            program: self.path.clone(),
            source,
        }
    }
}

/// Waits on `child` from a detached thread so it never lingers as a zombie.
pub(crate) fn reap_in_background(mut child: Child) -> thread::JoinHandle<io::Result<ExitStatus>> {
    thread::spawn(move || child.wait())
}

#[cfg(unix)]
fn detach(command: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut std::process::Command) {}

#[cfg(windows)]
fn hide_window(command: &mut Command) {
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_window(_command: &mut Command) {}
