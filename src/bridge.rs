//! Backend bridge — forwards job payloads to a local Ollama-style chat API.
//!
//! Tries the primary endpoint then any fallbacks in order, and tolerates
//! backends that answer with newline-delimited JSON instead of a single
//! object.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::JobHandler;
use crate::error::BridgeError;

/// HTTP bridge to the chat backend. One instance per process, constructed
/// once at startup and shared by the dispatcher.
pub struct ChatBridge {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl ChatBridge {
    /// Build the bridge with its own HTTP client. Certificate validation is
    /// disabled — backends live on trusted local or private networks.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| BridgeError::Client(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    /// Call the chat API with `payload` as the request body. Candidates are
    /// tried in order; on exhaustion the *last* candidate's error wins,
    /// earlier failures are only logged.
    pub async fn chat(&self, payload: &Value) -> Result<Value, BridgeError> {
        if self.endpoints.is_empty() {
            return Err(BridgeError::NoEndpoints);
        }
        let mut last_err = None;
        for base in &self.endpoints {
            let url = format!("{}/api/chat", base.trim_end_matches('/'));
            match self.try_endpoint(&url, payload).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(%url, error = %e, "Backend call failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(BridgeError::NoEndpoints))
    }

    async fn try_endpoint(&self, url: &str, payload: &Value) -> Result<Value, BridgeError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BridgeError::Request {
                url: url.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status {
                url: url.into(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| BridgeError::Request {
            url: url.into(),
            reason: e.to_string(),
        })?;
        parse_lenient(url, &body)
    }
}

#[async_trait]
impl JobHandler for ChatBridge {
    async fn call(&self, payload: Value) -> Result<Value, BridgeError> {
        self.chat(&payload).await
    }
}

/// Strict parse first; if the body is not one JSON value, scan it line by
/// line and return the first line that parses. Some local chat backends
/// stream multiple objects even with `"stream": false`.
fn parse_lenient(url: &str, body: &str) -> Result<Value, BridgeError> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            for line in body.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Ok(value) = serde_json::from_str(line) {
                    return Ok(value);
                }
            }
            Err(BridgeError::Parse {
                url: url.into(),
                reason: strict_err.to_string(),
            })
        }
    }
}
