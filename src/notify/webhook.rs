// src/notify/webhook.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{backoff, is_retryable_status, DeliveryChannel};
use crate::error::DeliveryError;
use crate::store::SubscriberId;

const CHANNEL: &str = "webhook";

/// Posts `{ "subscriber": .., "text": .. }` to a fixed URL.
#[derive(Clone)]
pub struct WebhookChannel {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subscriber: &'a str,
    text: &'a str,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            subscriber: to.as_str(),
            text,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => {
                    let status = rsp.status().as_u16();
                    let err = DeliveryError::Status {
                        channel: CHANNEL,
                        status,
                    };
                    if !is_retryable_status(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => DeliveryError::Request {
                    channel: CHANNEL,
                    message: e.to_string(),
                },
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "webhook retry");
            tokio::time::sleep(backoff(attempt)).await;
        }
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}
