//! Blocking HTTP client for the Stockit API.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::debug;

use super::{ExternalInventory, HttpMethod, SyncError, SyncRequest, SyncResponse};

#[derive(Debug, Clone)]
pub struct StockitClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl StockitClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_millis(5000),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct StockitClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    http: Client,
}

impl StockitClient {
    pub fn new(config: StockitClientConfig) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            timeout: config.timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_transport(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl ExternalInventory for StockitClient {
    fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        let url = self.url_for(request.action.path());
        let mut req = match request.action.method() {
            HttpMethod::Post => self.http.post(&url),
            HttpMethod::Put => self.http.put(&url),
        };
        req = req.header("Accept", "application/json").json(&request.body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        debug!(action = %request.action, url = %url, "sending stockit request");
        let resp = req.send().map_err(|e| self.map_transport(e))?;
        let status = resp.status();
        let text = resp.text().map_err(|e| self.map_transport(e))?;

        // Stockit reports validation failures as `{"errors": {..}}`, sometimes with a 2xx status.
        let decoded = if text.trim().is_empty() {
            Ok(SyncResponse::default())
        } else {
            serde_json::from_str::<SyncResponse>(&text)
        };

        match decoded {
            Ok(body) if !body.errors.is_empty() => Err(SyncError::Rejected(body.errors)),
            Ok(body) if status.is_success() => Ok(body),
            Ok(_) => Err(rejected_status(status, &text)),
            Err(e) if status.is_success() => Err(SyncError::Decode(e.to_string())),
            Err(_) => Err(rejected_status(status, &text)),
        }
    }
}

fn rejected_status(status: StatusCode, text: &str) -> SyncError {
    SyncError::Transport(format!("stockit returned {}: {}", status.as_u16(), text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let client = StockitClient::new(StockitClientConfig::new("http://stockit.local/")).unwrap();
        assert_eq!(client.base_url(), "http://stockit.local");
        assert_eq!(client.url_for("/api/v1/items"), "http://stockit.local/api/v1/items");
    }

    #[test]
    fn unreachable_host_is_a_sync_error() {
        let client = StockitClient::new(
            StockitClientConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(200)),
        )
        .unwrap();
        let request = SyncRequest {
            action: super::super::SyncAction::Create,
            body: serde_json::json!({}),
        };
        match client.send(&request) {
            Err(SyncError::Transport(_)) | Err(SyncError::Timeout(_)) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
