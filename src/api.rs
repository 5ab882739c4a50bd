// API client module: a small blocking HTTP client for the NetworkSage
// sample API. Every request carries the `apikey` header; every response
// is the service's `{"error": bool, "body": ...}` envelope.

use crate::capture::SampleKind;
use crate::config::Config;
use crate::error::ApiError;
use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client, ClientBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Results the service can generate for an uploaded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleAction {
    Summary,
    Categorization,
}

impl SampleAction {
    /// Path segment under the sample URL, also the key holding the
    /// payload inside the response body.
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleAction::Summary => "summary",
            SampleAction::Categorization => "categorization",
        }
    }
}

impl fmt::Display for SampleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level information about a private sample. `trafficDate` stays a
/// `serde_json::Value` since the service has sent it both as a string and
/// as a number; it is empty until processing finishes.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SampleMetadata {
    #[serde(rename = "dateCreated", default)]
    pub date_created: String,
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "trafficDate", default)]
    pub traffic_date: Value,
}

impl SampleMetadata {
    pub fn is_processed(&self) -> bool {
        match &self.traffic_date {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        }
    }
}

/// State of a summary/categorization on the service side.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionState {
    Generated(Value),
    Pending(Option<String>),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    body: Value,
}

/// Operations the demo flows need from the service. `ApiClient` is the
/// HTTP implementation; tests substitute a mock.
#[cfg_attr(test, mockall::automock)]
pub trait SampleApi {
    /// Upload a capture and return the private sample ID.
    fn upload_sample(&self, path: &Path, kind: SampleKind) -> Result<String, ApiError>;

    /// `None` while the service has nothing recorded for the sample.
    fn sample_metadata(&self, sample_id: &str) -> Result<Option<SampleMetadata>, ApiError>;

    /// Ask the service to start generating `action` for the sample.
    fn request_action(&self, sample_id: &str, action: SampleAction) -> Result<(), ApiError>;

    fn fetch_action(&self, sample_id: &str, action: SampleAction) -> Result<ActionState, ApiError>;
}

/// Blocking client holding the reqwest client (with the API key installed
/// as a default header) and the resolved endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_builder(config, Client::builder())
    }

    fn with_builder(config: Config, builder: ClientBuilder) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&config.api_key)
            .context("API key contains characters not allowed in an HTTP header")?;
        key.set_sensitive(true);
        headers.insert("apikey", key);

        let client = builder
            .default_headers(headers)
            .user_agent(concat!("networksage-demo/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient { client, config })
    }

    fn read_body(
        url: &str,
        res: std::result::Result<Response, reqwest::Error>,
    ) -> Result<Value, ApiError> {
        let res = res.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = res.status().as_u16();
        let text = res.text().map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        debug!(url, status, bytes = text.len(), "response received");
        parse_envelope(url, status, &text)
    }
}

impl SampleApi for ApiClient {
    fn upload_sample(&self, path: &Path, kind: SampleKind) -> Result<String, ApiError> {
        let url = self.config.upload_url();
        let io_err = |source| ApiError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // A known length keeps the body out of chunked transfer encoding.
        let len = file.metadata().map_err(io_err)?.len();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("sample")
            .to_string();

        let part = multipart::Part::reader_with_length(file, len)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        let form = multipart::Form::new()
            .text("type", kind.upload_type())
            .part("file", part);

        debug!(%url, kind = kind.upload_type(), "uploading sample");
        let body = Self::read_body(&url, self.client.post(&url).multipart(form).send())?;
        sample_id_from_body(&body)
    }

    fn sample_metadata(&self, sample_id: &str) -> Result<Option<SampleMetadata>, ApiError> {
        let url = self.config.sample_url(sample_id);
        let body = Self::read_body(&url, self.client.get(&url).send())?;
        metadata_from_body(body)
    }

    fn request_action(&self, sample_id: &str, action: SampleAction) -> Result<(), ApiError> {
        let url = self.config.action_url(sample_id, action.as_str());
        debug!(%url, "requesting generation");
        Self::read_body(&url, self.client.post(&url).send())?;
        Ok(())
    }

    fn fetch_action(&self, sample_id: &str, action: SampleAction) -> Result<ActionState, ApiError> {
        let url = self.config.action_url(sample_id, action.as_str());
        let body = Self::read_body(&url, self.client.get(&url).send())?;
        Ok(action_state_from_body(&body, action))
    }
}

/// Check the HTTP status and the envelope's error flag, returning `body`.
pub fn parse_envelope(url: &str, status: u16, text: &str) -> Result<Value, ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            url: url.to_string(),
            status,
            body: text.to_string(),
        });
    }
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| ApiError::Malformed(format!("{} from {}: {}", e, url, text)))?;
    if envelope.error {
        let message = match envelope.body {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(ApiError::Service(message));
    }
    Ok(envelope.body)
}

pub fn sample_id_from_body(body: &Value) -> Result<String, ApiError> {
    body.get("sampleId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Malformed(format!("no sampleId in upload response: {}", body)))
}

pub fn metadata_from_body(body: Value) -> Result<Option<SampleMetadata>, ApiError> {
    let empty = match &body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return Ok(None);
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| ApiError::Malformed(format!("sample metadata: {}", e)))
}

/// A payload counts as generated when the status says so, or when the
/// service returns it without any status at all.
pub fn action_state_from_body(body: &Value, action: SampleAction) -> ActionState {
    let status = body.get("status").and_then(Value::as_str).map(str::to_string);
    let payload = body.get(action.as_str()).filter(|v| !v.is_null());
    match (status.as_deref(), payload) {
        (Some("generated"), Some(p)) | (None, Some(p)) => ActionState::Generated(p.clone()),
        _ => ActionState::Pending(status),
    }
}

/// The service usually ships the result as a JSON document encoded in a
/// string; inline objects are accepted too.
pub fn decode_payload(payload: Value) -> Result<Value, ApiError> {
    match payload {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|e| ApiError::Malformed(format!("payload is not JSON: {}", e))),
        other => Ok(other),
    }
}
