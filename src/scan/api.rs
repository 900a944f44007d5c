//! Blocking HTTP client for the scan backend.

use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::sse::SseReader;
use super::wire::{CompletePayload, StartAck, StartScanRequest, StatusResponse};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
pub const START_SCAN_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Read timeout on the stream socket. Each expiry is one idle tick, which
/// also bounds how long a cancelled subscription keeps its connection.
pub const STREAM_READ_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not reach backend: {0}")]
    Transport(String),

    #[error("invalid response from backend: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),
}

impl From<ureq::Error> for ApiError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                Self::Status {
                    status,
                    message: error_message_from_body(&body)
                        .unwrap_or_else(|| format!("request failed with status {status}")),
                }
            }
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

/// Pulls `message`/`error` out of a JSON error body, if there is one.
fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

pub type EventStream = SseReader<Box<dyn Read + Send + Sync + 'static>>;

#[derive(Clone)]
pub struct ScanApi {
    base_url: String,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
    stream_idle_timeout: Duration,
}

impl ScanApi {
    pub fn new(base_url: impl Into<String>, stream_idle_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(REQUEST_TIMEOUT)
            .build();
        let stream_agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(STREAM_READ_TICK)
            .build();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            agent,
            stream_agent,
            stream_idle_timeout,
        }
    }

    /// Consecutive idle ticks after which a silent stream is treated as dead.
    pub fn stream_idle_ticks(&self) -> u32 {
        let ticks = self.stream_idle_timeout.as_millis().div_ceil(STREAM_READ_TICK.as_millis());
        u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /api/start-scan`.
    pub fn start_scan(&self, request: &StartScanRequest) -> Result<StartAck, ApiError> {
        let response = self
            .agent
            .post(&self.url("/api/start-scan"))
            .timeout(START_SCAN_TIMEOUT)
            .send_json(request)?;
        let ack: StartAck = decode(response)?;
        match ack.backend_error() {
            Some(message) => Err(ApiError::Backend(message)),
            None => Ok(ack),
        }
    }

    /// `GET /api/scan-status`.
    pub fn scan_status(&self) -> Result<StatusResponse, ApiError> {
        let response = self.agent.get(&self.url("/api/scan-status")).call()?;
        decode(response)
    }

    /// `GET /api/start-scan[?target=T]`, the saved-results read path.
    pub fn fetch_results(&self, target: Option<&str>) -> Result<CompletePayload, ApiError> {
        let mut request = self.agent.get(&self.url("/api/start-scan"));
        if let Some(target) = target {
            request = request.query("target", target);
        }
        decode(request.call()?)
    }

    /// `GET /api/scan-stream?target=T`, returning a frame iterator over the body.
    pub fn open_stream(&self, target: &str) -> Result<EventStream, ApiError> {
        let response = self
            .stream_agent
            .get(&self.url("/api/scan-stream"))
            .query("target", target)
            .set("Accept", "text/event-stream")
            .set("Cache-Control", "no-cache")
            .call()?;

        let content_type = response.content_type().to_owned();
        if !content_type.starts_with("text/event-stream") {
            tracing::warn!(%content_type, "scan stream answered with unexpected content type");
        }

        let reader: Box<dyn Read + Send + Sync + 'static> = response.into_reader();
        Ok(SseReader::new(reader))
    }
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ApiError> {
    response
        .into_json::<T>()
        .map_err(|error| ApiError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message_from_body(r#"{"status":"error","message":"Missing 'target' (ip) parameter"}"#)
                .as_deref(),
            Some("Missing 'target' (ip) parameter")
        );
        assert_eq!(
            error_message_from_body(r#"{"error":"File not found"}"#).as_deref(),
            Some("File not found")
        );
        assert_eq!(error_message_from_body("<html>oops</html>"), None);
    }

    #[test]
    fn base_url_is_normalized() {
        let api = ScanApi::new("http://127.0.0.1:5000/", Duration::from_secs(30));
        assert_eq!(api.base_url(), "http://127.0.0.1:5000");
        assert_eq!(api.url("/api/scan-status"), "http://127.0.0.1:5000/api/scan-status");
    }

    #[test]
    fn idle_timeout_is_counted_in_read_ticks() {
        let api = ScanApi::new(DEFAULT_BACKEND_URL, Duration::from_secs(45));
        assert_eq!(api.stream_idle_ticks(), 45);

        let api = ScanApi::new(DEFAULT_BACKEND_URL, Duration::from_millis(1500));
        assert_eq!(api.stream_idle_ticks(), 2);

        let api = ScanApi::new(DEFAULT_BACKEND_URL, Duration::ZERO);
        assert_eq!(api.stream_idle_ticks(), 1);
    }
}
