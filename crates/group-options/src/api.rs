//! Thin JSON-over-HTTP client for the school API.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;

pub const TEACHERS_PATH: &str = "/api/cims/teacherIDs";
pub const CLASSES_PATH: &str = "/api/cims/classes";
pub const STUDENTS_PATH: &str = "/api/cims/students";
pub const PARTITION_PATH: &str = "/api/personalityData";

/// Transport-level failure, mapped by callers onto their own error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {path} failed: {message}")]
    Network { path: String, message: String },

    #[error("{path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("{path} returned a body that is not JSON: {message}")]
    Decode { path: String, message: String },
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.base_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let request = self.http.get(self.url(path));
        self.send(path, request).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, TransportError> {
        let request = self.http.post(self.url(path)).json(body);
        self.send(path, request).await
    }

    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, TransportError> {
        let response = request.send().await.map_err(|e| TransportError::Network {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| TransportError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = ApiClient::new("http://cims.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://cims.local");
        assert_eq!(api.url(TEACHERS_PATH), "http://cims.local/api/cims/teacherIDs");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 (discard) on loopback is closed on test machines.
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = api.get_json(TEACHERS_PATH).await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }), "{err}");
    }
}
