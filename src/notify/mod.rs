// src/notify/mod.rs
//! Delivery channels and the message renderer.

pub mod log;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::DeliveryError;
use crate::probe::types::MatchResult;
use crate::store::SubscriberId;

const MAX_LISTED: usize = 15;
/// Telegram's `sendMessage` text limit, counted in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;
// Room kept for the "…and N more" line.
const MORE_RESERVE: usize = 32;
const MAX_QUERY_SHOWN: usize = 200;

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Build one batched notification for a subscription's new results.
///
/// At most `MAX_LISTED` results are listed and the whole text stays within
/// `MAX_MESSAGE_LEN`; whatever does not fit is summarized in a trailing
/// "…and N more" line.
pub fn render_matches(display_query: &str, fresh: &[MatchResult], finished: bool) -> String {
    let shown: String = display_query.chars().take(MAX_QUERY_SHOWN).collect();
    let mut out = format!("🎉 '{shown}' is now available!\n");
    let footer = if finished {
        format!("\n\n✅ Stopped watching '{shown}'.")
    } else {
        String::new()
    };
    let budget = MAX_MESSAGE_LEN - MORE_RESERVE - msg_len(&footer);

    let mut listed = 0;
    for m in fresh.iter().take(MAX_LISTED) {
        let mut entry = format!("\n• {}: {}", m.source, m.text);
        if let Some(url) = &m.url {
            entry.push_str(&format!("\n  {url}"));
        }
        if msg_len(&out) + msg_len(&entry) > budget {
            break;
        }
        out.push_str(&entry);
        listed += 1;
    }
    if fresh.len() > listed {
        out.push_str(&format!("\n\n…and {} more", fresh.len() - listed));
    }
    out.push_str(&footer);
    out
}

fn msg_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Pick the transport: Telegram when a bot token is present, then a webhook,
/// otherwise just log the messages. `timeout_secs` and `retries` apply per
/// send attempt and per message.
pub fn select_channel(
    bot_token: Option<&str>,
    webhook_url: Option<&str>,
    timeout_secs: u64,
    retries: u8,
) -> Arc<dyn DeliveryChannel> {
    if let Some(token) = bot_token {
        return Arc::new(
            telegram::TelegramChannel::new(token)
                .with_timeout(timeout_secs)
                .with_retries(retries),
        );
    }
    if let Some(url) = webhook_url {
        return Arc::new(
            webhook::WebhookChannel::new(url)
                .with_timeout(timeout_secs)
                .with_retries(retries),
        );
    }
    tracing::info!(target: "notify", "no BOT_TOKEN or NOTIFY_WEBHOOK_URL; notifications go to the log");
    Arc::new(log::LogChannel)
}

pub(crate) fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.saturating_sub(1)).min(6))
}

/// 429 and 5xx are worth another attempt; other statuses won't change.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_each_result_with_link() {
        let fresh = vec![
            MatchResult::new("A", Some("https://a/animal".into()), "Animal (2023)"),
            MatchResult::new("B", None, "Animal HD"),
        ];
        let text = render_matches("Animal", &fresh, false);
        assert!(text.starts_with("🎉 'Animal' is now available!"));
        assert!(text.contains("• A: Animal (2023)\n  https://a/animal"));
        assert!(text.contains("• B: Animal HD"));
        assert!(!text.contains("Stopped watching"));
    }

    #[test]
    fn render_truncates_long_batches_and_marks_completion() {
        let fresh: Vec<_> = (0..20)
            .map(|i| MatchResult::new("A", Some(format!("https://a/{i}")), format!("hit {i}")))
            .collect();
        let text = render_matches("x", &fresh, true);
        assert!(text.contains("https://a/14"));
        assert!(!text.contains("https://a/15"));
        assert!(text.contains("…and 5 more"));
        assert!(text.ends_with("✅ Stopped watching 'x'."));
    }

    #[test]
    fn render_stays_within_telegram_limit() {
        let long_text = "A".repeat(300);
        let fresh: Vec<_> = (0..15)
            .map(|i| {
                let url = format!(
                    "https://www.some-very-long-mirror-domain.example.org/movies/2023/animal-hindi-1080p-web-dl/{i:04}/"
                );
                MatchResult::new("HDHub4u", Some(url), long_text.clone())
            })
            .collect();
        let query = "Animal ".repeat(100);
        let text = render_matches(&query, &fresh, true);
        assert!(msg_len(&text) <= MAX_MESSAGE_LEN, "{} units", msg_len(&text));
        assert!(text.contains("/0000/"));
        assert!(!text.contains("/0014/"));
        assert!(text.contains(" more"));
        assert!(text.ends_with("'."));
    }

    #[test]
    fn channel_selection_prefers_telegram_then_webhook() {
        assert_eq!(select_channel(Some("1:x"), Some("http://h/"), 5, 2).name(), "telegram");
        assert_eq!(select_channel(None, Some("http://h/"), 5, 2).name(), "webhook");
        assert_eq!(select_channel(None, None, 5, 2).name(), "log");
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(3), Duration::from_millis(2000));
    }
}
