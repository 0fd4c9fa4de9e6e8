//! `Relay` trait and the `HttpRelay` implementation.
//!
//! Every provider call goes through a single relay endpoint that attaches
//! authentication.  The request body is always
//! `{"endpoint": "...", "method": "...", "body": {...}}`; the response is JSON
//! for chat/transcription and raw audio bytes for speech synthesis.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// RelayError
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// HTTP transport or connection error.
    #[error("relay request failed: {0}")]
    Request(String),

    /// The call did not complete within its deadline.
    #[error("relay request timed out after {0:?}")]
    Timeout(Duration),

    /// The relay (or the upstream provider) answered with a non-2xx status.
    #[error("relay returned {status}: {error}")]
    Status {
        status: u16,
        error: String,
        details: Option<String>,
    },

    /// The response body could not be decoded.
    #[error("failed to decode relay response: {0}")]
    Parse(String),

    /// JSON arrived where audio was expected, or the other way round.
    #[error("unexpected relay response body: expected {expected}")]
    UnexpectedBody { expected: &'static str },
}

impl RelayError {
    /// `true` for failures where the request may never have reached the
    /// provider (safe to retry with the same body).
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Request(_) | RelayError::Timeout(_))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayError::Timeout(Duration::ZERO)
        } else {
            RelayError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint / RelayRequest / RelayResponse
// ---------------------------------------------------------------------------

/// Upstream capability requested through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletions,
    AudioTranscriptions,
    AudioSpeech,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "/v1/chat/completions",
            Endpoint::AudioTranscriptions => "/v1/audio/transcriptions",
            Endpoint::AudioSpeech => "/v1/audio/speech",
        }
    }

    /// Speech synthesis answers with raw audio rather than JSON.
    pub fn is_audio_synthesis(&self) -> bool {
        matches!(self, Endpoint::AudioSpeech)
    }
}

/// Wire shape of a relay call.
#[derive(Debug, Clone, Serialize)]
pub struct RelayRequest {
    pub endpoint: &'static str,
    pub method: &'static str,
    pub body: serde_json::Value,
    #[serde(skip)]
    kind: Endpoint,
}

impl RelayRequest {
    /// A `POST` to `endpoint` carrying `body` through unchanged.
    pub fn post(endpoint: Endpoint, body: serde_json::Value) -> Self {
        Self {
            endpoint: endpoint.path(),
            method: "POST",
            body,
            kind: endpoint,
        }
    }

    pub fn kind(&self) -> Endpoint {
        self.kind
    }
}

/// Decoded relay response.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayResponse {
    Json(serde_json::Value),
    Audio(Vec<u8>),
}

impl RelayResponse {
    pub fn into_json(self) -> Result<serde_json::Value, RelayError> {
        match self {
            RelayResponse::Json(v) => Ok(v),
            RelayResponse::Audio(_) => Err(RelayError::UnexpectedBody { expected: "JSON" }),
        }
    }

    pub fn into_audio(self) -> Result<Vec<u8>, RelayError> {
        match self {
            RelayResponse::Audio(bytes) => Ok(bytes),
            RelayResponse::Json(_) => Err(RelayError::UnexpectedBody { expected: "audio" }),
        }
    }
}

/// Error payload for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Relay trait
// ---------------------------------------------------------------------------

/// Async seam for provider calls.
///
/// Calls are idempotent from the caller's point of view: sending the same
/// request again after a failure is always allowed.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send(
        &self,
        request: RelayRequest,
        timeout: Duration,
    ) -> Result<RelayResponse, RelayError>;
}

// ---------------------------------------------------------------------------
// HttpRelay
// ---------------------------------------------------------------------------

/// `reqwest`-backed relay client.  Holds no provider secret.
pub struct HttpRelay {
    client: reqwest::Client,
    url: String,
}

impl HttpRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_inner(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (error, details) = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => (
                    body.error.unwrap_or_else(|| status.to_string()),
                    body.details.map(|d| match d {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    }),
                ),
                Err(_) => (status.to_string(), (!text.is_empty()).then_some(text)),
            };
            return Err(RelayError::Status {
                status: status.as_u16(),
                error,
                details,
            });
        }

        if request.kind().is_audio_synthesis() {
            let bytes = response.bytes().await?;
            Ok(RelayResponse::Audio(bytes.to_vec()))
        } else {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| RelayError::Parse(e.to_string()))?;
            Ok(RelayResponse::Json(json))
        }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    /// The deadline covers the whole exchange; on expiry the in-flight
    /// request is dropped.
    async fn send(
        &self,
        request: RelayRequest,
        timeout: Duration,
    ) -> Result<RelayResponse, RelayError> {
        let endpoint = request.endpoint;
        match tokio::time::timeout(timeout, self.send_inner(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(RelayError::Timeout(_))) | Err(_) => {
                log::warn!("relay: {endpoint} timed out after {timeout:?}");
                Err(RelayError::Timeout(timeout))
            }
            Ok(Err(e)) => {
                log::warn!("relay: {endpoint} failed: {e}");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
