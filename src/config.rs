//! Runtime configuration: API key, endpoints and polling cadence.

use crate::error::ConfigError;
use std::time::Duration;

pub const API_KEY_ENV: &str = "NETWORKSAGE_DEMO_API_KEY";
pub const API_URL_ENV: &str = "NETWORKSAGE_API_URL";
pub const DEFAULT_API_URL: &str = "https://api.seclarity.io/";
pub const UI_SAMPLE_URL: &str = "https://networksage.seclarity.io/samples/";
pub const DEFAULT_POLL_SECS: u64 = 2;

const UPLOAD_PATH: &str = "upload/v1.0/uploader";
const SAMPLES_PATH: &str = "sec/v1.0/samples/";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    /// Always ends with `/`.
    pub base_url: String,
    pub poll_interval: Duration,
}

impl Config {
    /// Resolve configuration from the process environment. Fails before
    /// anything touches the network when the key is absent.
    pub fn from_env(poll_interval: Duration) -> Result<Self, ConfigError> {
        Self::resolve(
            std::env::var(API_KEY_ENV).ok(),
            std::env::var(API_URL_ENV).ok(),
            poll_interval,
        )
    }

    pub fn resolve(
        api_key: Option<String>,
        base_url: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))?;

        let base_url = match base_url.map(|u| u.trim().to_string()) {
            Some(u) if !u.is_empty() => u,
            _ => DEFAULT_API_URL.to_string(),
        };
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidEndpoint(base_url));
        }
        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{}/", base_url)
        };

        Ok(Config {
            api_key,
            base_url,
            poll_interval,
        })
    }

    pub fn upload_url(&self) -> String {
        format!("{}{}", self.base_url, UPLOAD_PATH)
    }

    pub fn sample_url(&self, sample_id: &str) -> String {
        format!("{}{}{}", self.base_url, SAMPLES_PATH, sample_id)
    }

    pub fn action_url(&self, sample_id: &str, action: &str) -> String {
        format!("{}/{}", self.sample_url(sample_id), action)
    }
}

/// Link to a sample in the NetworkSage web UI.
pub fn ui_sample_link(sample_id: &str) -> String {
    format!("{}{}", UI_SAMPLE_URL, sample_id)
}
