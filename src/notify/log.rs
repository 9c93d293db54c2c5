// src/notify/log.rs
use async_trait::async_trait;

use super::DeliveryChannel;
use crate::error::DeliveryError;
use crate::store::SubscriberId;

/// Fallback channel: writes the notification to the log and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(target: "notify", subscriber = %to, %text, "notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
