// src/bot.rs
//! Telegram long-poll transport: pulls updates, routes text messages through
//! the command router and sends the replies back to the chat.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::commands::CommandRouter;
use crate::notify::telegram::TelegramChannel;
use crate::notify::DeliveryChannel;
use crate::store::SubscriberId;

const LONG_POLL_SECS: u64 = 30;
const ERROR_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Decode a `getUpdates` batch item by item. The returned offset moves past
/// every item that carries an `update_id`, including ones that fail to
/// decode, so a bad update is skipped instead of fetched again.
pub fn parse_updates(offset: i64, items: Vec<serde_json::Value>) -> (i64, Vec<Update>) {
    let mut next = offset;
    let mut updates = Vec::with_capacity(items.len());
    for item in items {
        if let Some(id) = item.get("update_id").and_then(|v| v.as_i64()) {
            next = next.max(id + 1);
        }
        match serde_json::from_value::<Update>(item) {
            Ok(u) => updates.push(u),
            Err(e) => tracing::warn!(target: "bot", error = %e, "skipping unparseable update"),
        }
    }
    (next, updates)
}

pub struct BotTransport {
    api: TelegramChannel,
    router: CommandRouter,
    offset: i64,
}

impl BotTransport {
    pub fn new(api: TelegramChannel, router: CommandRouter) -> Self {
        Self {
            api,
            router,
            offset: 0,
        }
    }

    /// Reply for one update, if it carries a command we understand.
    pub fn route_update(&self, update: &Update) -> Option<(SubscriberId, String)> {
        let msg = update.message.as_ref()?;
        let text = msg.text.as_deref()?;
        let chat = SubscriberId::from(msg.chat.id);
        let reply = self.router.handle(chat.clone(), text)?;
        Some((chat, reply))
    }

    async fn poll_once(&mut self) -> Result<usize, crate::error::DeliveryError> {
        let body = json!({
            "offset": self.offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });
        let raw = self
            .api
            .call("getUpdates", &body, Duration::from_secs(LONG_POLL_SECS + 10))
            .await?;

        let items: Vec<serde_json::Value> = match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "bot", error = %e, "getUpdates result is not a list");
                Vec::new()
            }
        };
        let (offset, updates) = parse_updates(self.offset, items);
        self.offset = offset;

        for update in &updates {
            let Some((chat, reply)) = self.route_update(update) else {
                continue;
            };
            if let Err(e) = self.api.send(&chat, &reply).await {
                tracing::warn!(target: "bot", error = %e, subscriber = %chat, "reply failed");
            }
        }
        Ok(updates.len())
    }

    /// Poll forever. Errors are logged and retried after a short pause.
    pub async fn run(mut self) {
        tracing::info!(target: "bot", "telegram long-poll started");
        loop {
            match self.poll_once().await {
                Ok(n) => tracing::trace!(target: "bot", updates = n, "poll"),
                Err(e) => {
                    tracing::warn!(target: "bot", error = %e, "getUpdates failed");
                    tokio::time::sleep(ERROR_PAUSE).await;
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
