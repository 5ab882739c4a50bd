// Error types shared by the API client and the configuration loader.
// The binary works with `anyhow::Result`; these enums give the library
// callers (and tests) something concrete to match on.

use thiserror::Error;

/// Failures talking to the NetworkSage API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The envelope came back with `"error": true`.
    #[error("service reported an error: {0}")]
    Service(String),

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Problems resolving the runtime configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set; export your NetworkSage API key before running")]
    MissingApiKey(&'static str),

    #[error("invalid API endpoint '{0}': must start with http:// or https://")]
    InvalidEndpoint(String),
}
