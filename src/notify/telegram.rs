// src/notify/telegram.rs
//! Minimal Telegram Bot API client: `sendMessage` for notifications and the
//! raw `call` the long-poll transport uses for `getUpdates`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{backoff, is_retryable_status, DeliveryChannel};
use crate::error::DeliveryError;
use crate::store::SubscriberId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const CHANNEL: &str = "telegram";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Value,
}

#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    token: String,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// One Bot API call, no retries. Returns the `result` field.
    pub async fn call(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, DeliveryError> {
        let rsp = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // reqwest errors embed the URL, and with it the token.
            .map_err(|e| DeliveryError::Request {
                channel: CHANNEL,
                message: e.without_url().to_string(),
            })?;

        let status = rsp.status().as_u16();
        let parsed: Option<ApiResponse> = rsp.json().await.ok();
        match parsed {
            Some(api) if api.ok => Ok(api.result),
            Some(api) if !is_retryable_status(status) => Err(DeliveryError::Rejected {
                channel: CHANNEL,
                message: api
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            }),
            _ => Err(DeliveryError::Status {
                channel: CHANNEL,
                status,
            }),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let body = json!({
            "chat_id": to.as_str(),
            "text": text,
            "disable_web_page_preview": true,
        });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.call("sendMessage", &body, self.timeout).await {
                Ok(_) => return Ok(()),
                // Bad chat id, bot blocked, ... retrying won't help.
                Err(e @ DeliveryError::Rejected { .. }) => return Err(e),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    tracing::debug!(target: "notify", attempt, error = %e, "telegram retry");
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_uses_trimmed_base() {
        let ch = TelegramChannel::new("123:abc").with_api_base("http://localhost:8081/");
        assert_eq!(
            ch.method_url("sendMessage"),
            "http://localhost:8081/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn api_response_tolerates_missing_fields() {
        let r: ApiResponse = serde_json::from_str(r#"{"ok":false,"error_code":400}"#).unwrap();
        assert!(!r.ok);
        assert!(r.description.is_none());
        assert!(r.result.is_null());
    }
}
