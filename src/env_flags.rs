use std::path::PathBuf;

fn parse_env_bool(var: &str) -> Option<bool> {
    std::env::var(var).ok().and_then(|value| parse_bool(&value))
}

fn parse_bool(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" | "enable" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}

fn parse_env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
    parse_env_string(var).and_then(|value| value.parse().ok())
}

pub fn service_url() -> Option<String> {
    parse_env_string("BYZE_SERVICE_URL")
}

pub fn download_url() -> Option<String> {
    parse_env_string("BYZE_DOWNLOAD_URL")
}

pub fn install_dir() -> Option<PathBuf> {
    parse_env_string("BYZE_INSTALL_DIR").map(PathBuf::from)
}

pub fn expected_sha256() -> Option<String> {
    parse_env_string("BYZE_EXPECTED_SHA256")
}

pub fn prompt_port() -> Option<u16> {
    parse_env_number("BYZE_PROMPT_PORT")
}

pub fn consent_timeout_secs() -> Option<u64> {
    parse_env_number("BYZE_CONSENT_TIMEOUT_SECS")
}

pub fn verify_startup() -> Option<bool> {
    parse_env_bool("BYZE_VERIFY_STARTUP")
}

pub fn reuse_existing_binary() -> Option<bool> {
    parse_env_bool("BYZE_REUSE_EXISTING")
}
