//! Runtime configuration.

use std::{path::PathBuf, time::Duration};

use crate::request::Format;

pub const DEFAULT_BASE_URL: &str = "https://ooinet.oceanobservatories.org/api/m2m/12576/sensor/inv/";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub username: Option<String>,
    pub token: Option<String>,
    pub cache_path: PathBuf,
    pub expiry_days: u32,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub concurrency_threshold: usize,
    pub max_workers: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub format: Format,
    /// Overrides the file pattern implied by `format`.
    pub file_pattern: Option<String>,
    pub exclude: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: None,
            token: None,
            cache_path: default_cache_path(),
            expiry_days: 14,
            max_attempts: 400,
            poll_interval: Duration::from_secs(3),
            concurrency_threshold: 5,
            max_workers: 4,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(120),
            format: Format::NetCdf,
            file_pattern: None,
            exclude: None,
        }
    }
}

impl Config {
    /// The regular expression result-file hrefs must match.
    pub fn file_pattern(&self) -> String {
        self.file_pattern
            .clone()
            .unwrap_or_else(|| self.format.file_pattern().to_string())
    }
}

pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ooi-m2m")
        .join("job_cache.json")
}

// -- Tests -------------------------------------------------------------------
