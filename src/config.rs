use crate::application::LookupOptions;
use crate::domain::value_objects::{BackendKind, Hotkey, HotkeyError};
use crate::infrastructure::backoff::BackoffConfig;
use crate::infrastructure::fetch_engine::EngineConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected google, baidu or none)")]
    UnknownBackend(String),

    #[error("invalid hotkey in {var}: {source}")]
    InvalidHotkey {
        var: &'static str,
        #[source]
        source: HotkeyError,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Lookup settings
    pub backend: Option<BackendKind>,
    pub enabled: bool,
    pub min_key_length: usize,
    pub cache_capacity: usize,
    pub max_requests: usize,
    pub debug: bool,

    // Transport settings
    pub max_response_bytes: usize,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub google_url: Option<String>,
    pub baidu_url: Option<String>,

    // Backoff settings
    pub error_threshold: u32,
    pub backoff_secs: u64,

    // Hotkeys
    pub toggle_key: Hotkey,
    pub reset_key: Hotkey,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Some(BackendKind::Google),
            enabled: true,
            min_key_length: 4,
            cache_capacity: 2048,
            max_requests: 100,
            debug: false,
            max_response_bytes: 2048,
            timeout_secs: 10,
            proxy: None,
            google_url: None,
            baidu_url: None,
            error_threshold: 10,
            backoff_secs: 300,
            toggle_key: default_hotkey('C'),
            reset_key: default_hotkey('R'),
        }
    }
}

fn default_hotkey(key: char) -> Hotkey {
    Hotkey {
        control: true,
        alt: true,
        shift: true,
        super_key: false,
        key: key.to_string(),
    }
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            request_timeout: Duration::from_secs(self.timeout_secs),
            max_response_bytes: self.max_response_bytes,
            proxy: self.proxy.clone(),
            ..EngineConfig::default()
        }
    }

    pub fn lookup_options(&self) -> LookupOptions {
        LookupOptions {
            min_key_length: self.min_key_length,
            cache_capacity: self.cache_capacity,
            max_requests: self.max_requests,
            max_response_bytes: self.max_response_bytes,
            backoff: BackoffConfig {
                error_threshold: self.error_threshold,
                backoff_duration: Duration::from_secs(self.backoff_secs),
            },
            backend: self.backend,
            enabled: self.enabled,
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    Ok(load_config_from(|name| std::env::var(name).ok())?)
}

/// Build a [`Config`] from an arbitrary variable lookup.
///
/// Numbers that fail to parse fall back to their defaults. An unknown
/// backend or a malformed hotkey is rejected.
pub fn load_config_from<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let backend = match lookup("CLOUDPINYIN_BACKEND") {
        Some(name) => parse_backend(&name)?,
        None => defaults.backend,
    };

    let enabled = lookup("CLOUDPINYIN_ENABLED")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(defaults.enabled);

    let min_key_length = lookup("CLOUDPINYIN_MIN_KEY_LENGTH")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.min_key_length);

    let cache_capacity = lookup("CLOUDPINYIN_CACHE_CAPACITY")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.cache_capacity);

    let max_requests = lookup("CLOUDPINYIN_MAX_REQUESTS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.max_requests);

    let debug = lookup("CLOUDPINYIN_DEBUG").is_some();

    // Transport settings
    let max_response_bytes = lookup("CLOUDPINYIN_MAX_RESPONSE_BYTES")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.max_response_bytes);

    let timeout_secs = lookup("CLOUDPINYIN_TIMEOUT_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.timeout_secs);

    let proxy = lookup("CLOUDPINYIN_PROXY").filter(|v| !v.trim().is_empty());
    let google_url = lookup("CLOUDPINYIN_GOOGLE_URL");
    let baidu_url = lookup("CLOUDPINYIN_BAIDU_URL");

    // Backoff settings
    let error_threshold = lookup("CLOUDPINYIN_ERROR_THRESHOLD")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.error_threshold);

    let backoff_secs = lookup("CLOUDPINYIN_BACKOFF_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.backoff_secs);

    // Hotkeys
    let toggle_key = match lookup("CLOUDPINYIN_TOGGLE_KEY") {
        Some(v) => Hotkey::parse(&v).map_err(|source| ConfigError::InvalidHotkey {
            var: "CLOUDPINYIN_TOGGLE_KEY",
            source,
        })?,
        None => defaults.toggle_key,
    };

    let reset_key = match lookup("CLOUDPINYIN_RESET_KEY") {
        Some(v) => Hotkey::parse(&v).map_err(|source| ConfigError::InvalidHotkey {
            var: "CLOUDPINYIN_RESET_KEY",
            source,
        })?,
        None => defaults.reset_key,
    };

    Ok(Config {
        backend,
        enabled,
        min_key_length,
        cache_capacity,
        max_requests,
        debug,
        max_response_bytes,
        timeout_secs,
        proxy,
        google_url,
        baidu_url,
        error_threshold,
        backoff_secs,
        toggle_key,
        reset_key,
    })
}

fn parse_backend(name: &str) -> Result<Option<BackendKind>, ConfigError> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    BackendKind::from_name(name)
        .map(Some)
        .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))
}
