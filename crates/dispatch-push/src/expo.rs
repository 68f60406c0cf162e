//! HTTP client for the Expo push API.

use dispatch_types::{PushError, PushGateway, PushMessage};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct PushResponse {
    data: Option<PushTicket>,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    id: Option<String>,
}

/// Gateway that POSTs one message per call to Expo (`/--/api/v2/push/send`).
pub struct ExpoPushGateway {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl ExpoPushGateway {
    pub fn new(url: String, access_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            access_token,
            timeout,
        }
    }

    pub fn from_env() -> Self {
        let url = std::env::var("EXPO_PUSH_URL").unwrap_or_else(|_| DEFAULT_EXPO_PUSH_URL.to_string());
        let access_token = std::env::var("EXPO_ACCESS_TOKEN").ok();
        let timeout_ms = match std::env::var("EXPO_PUSH_TIMEOUT_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid EXPO_PUSH_TIMEOUT_MS, using default");
                DEFAULT_TIMEOUT_MS
            }),
            Err(_) => DEFAULT_TIMEOUT_MS,
        };
        Self::new(url, access_token, Duration::from_millis(timeout_ms))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl PushGateway for ExpoPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<Option<String>, PushError> {
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate")
            .timeout(self.timeout)
            .json(message);
        if let Some(ref token) = self.access_token {
            req = req.bearer_auth(token);
        }
        let res = req
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PushError::Gateway {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: PushResponse =
            serde_json::from_str(&body).map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(parsed.data.and_then(|t| t.id))
    }
}
