use crate::service::reap_in_background;
use log::{debug, warn};
use std::process::{Command, Stdio};

/// Something that can show a URL to the user.
pub trait UrlOpener: Send + Sync {
    /// Fire-and-forget; failures are not reported back.
    fn open(&self, url: &str);
}

/// Default-browser launcher for the host OS, chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformOpener {
    Windows,
    MacOs,
    Unix,
}

impl PlatformOpener {
    pub fn current() -> Self {
        if cfg!(windows) {
            PlatformOpener::Windows
        } else if cfg!(target_os = "macos") {
            PlatformOpener::MacOs
        } else {
            PlatformOpener::Unix
        }
    }

    /// Program and arguments that open `url` on this platform.
    pub fn command_line(self, url: &str) -> (&'static str, Vec<String>) {
        match self {
            // The empty string is the window title `start` expects before a quoted target.
            PlatformOpener::Windows => (
                "cmd",
                vec!["/c".into(), "start".into(), String::new(), url.to_string()],
            ),
            PlatformOpener::MacOs => ("open", vec![url.to_string()]),
            PlatformOpener::Unix => ("xdg-open", vec![url.to_string()]),
        }
    }
}

impl UrlOpener for PlatformOpener {
    fn open(&self, url: &str) {
        let (program, args) = self.command_line(url);
        let spawned = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                debug!("launched {program} for {url}");
                reap_in_background(child);
            }
            Err(err) => {
                warn!("failed to run {program} for {url}: {err}; trying fallback opener");
                if let Err(err) = open::that_detached(url) {
                    warn!("failed to open browser at {url}: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:5000/install-prompt";

    #[test]
    fn windows_goes_through_cmd_start() {
        let (program, args) = PlatformOpener::Windows.command_line(URL);
        assert_eq!(program, "cmd");
        assert_eq!(args, vec!["/c", "start", "", URL]);
    }

    #[test]
    fn macos_uses_open() {
        let (program, args) = PlatformOpener::MacOs.command_line(URL);
        assert_eq!(program, "open");
        assert_eq!(args, vec![URL]);
    }

    #[test]
    fn other_unix_uses_xdg_open() {
        let (program, args) = PlatformOpener::Unix.command_line(URL);
        assert_eq!(program, "xdg-open");
        assert_eq!(args, vec![URL]);
    }

    #[test]
    fn current_matches_build_target() {
        let current = PlatformOpener::current();
        if cfg!(windows) {
            assert_eq!(current, PlatformOpener::Windows);
        } else if cfg!(target_os = "macos") {
            assert_eq!(current, PlatformOpener::MacOs);
        } else {
            assert_eq!(current, PlatformOpener::Unix);
        }
    }
}
