// src/commands.rs
//! Command surface: the `Watcher` facade (watch / cancel / list) and a
//! text-command router for chat transports.

use std::sync::Arc;

use crate::query::Query;
use crate::scheduler::Scheduler;
use crate::store::{SubscriberId, Subscription};

pub const USAGE: &str = "Usage: /notify <movie_name>";

pub const HELP: &str = "I watch movie sites and tell you when a title shows up.\n\n\
/notify <movie_name> - start watching\n\
/stop [movie_name] - stop one watch, or all of them\n\
/list - show what you're watching";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("query is empty")]
    EmptyQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Started(Subscription),
    AlreadyWatching(Subscription),
}

impl WatchOutcome {
    pub fn subscription(&self) -> &Subscription {
        match self {
            WatchOutcome::Started(s) | WatchOutcome::AlreadyWatching(s) => s,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, WatchOutcome::Started(_))
    }
}

/// The only mutation entry points besides the scheduler tick.
pub struct Watcher {
    scheduler: Scheduler,
    probe_on_watch: bool,
}

impl Watcher {
    pub fn new(scheduler: Scheduler, probe_on_watch: bool) -> Self {
        Self {
            scheduler,
            probe_on_watch,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Start watching `raw_query` for `subscriber`. A new watch gets one
    /// background check right away; the caller does not wait for it.
    pub fn watch(
        &self,
        subscriber: SubscriberId,
        raw_query: &str,
    ) -> Result<WatchOutcome, CommandError> {
        let query = Query::parse(raw_query).ok_or(CommandError::EmptyQuery)?;
        let (sub, is_new) = self.scheduler.store().upsert(subscriber, &query);
        if !is_new {
            return Ok(WatchOutcome::AlreadyWatching(sub));
        }

        tracing::info!(
            target: "commands",
            subscriber = %sub.key.subscriber,
            query = %sub.key.query,
            "watch started"
        );
        if self.probe_on_watch {
            self.scheduler.spawn_check(sub.clone());
        }
        Ok(WatchOutcome::Started(sub))
    }

    /// Cancel one watch, or every watch of the subscriber when no (non-blank)
    /// query is given. Returns how many were removed.
    pub fn cancel(&self, subscriber: &SubscriberId, raw_query: Option<&str>) -> usize {
        let query = raw_query.and_then(Query::parse);
        let n = self.scheduler.store().cancel(subscriber, query.as_ref());
        if n > 0 {
            tracing::info!(
                target: "commands",
                subscriber = %subscriber,
                query = query.as_ref().map(Query::normalized).unwrap_or("*"),
                cancelled = n,
                "watch cancelled"
            );
        }
        n
    }

    pub fn list(&self, subscriber: &SubscriberId) -> Vec<Subscription> {
        self.scheduler.store().list_for(subscriber)
    }
}

/// Parses chat commands and produces the reply text.
#[derive(Clone)]
pub struct CommandRouter {
    watcher: Arc<Watcher>,
}

impl CommandRouter {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        Self { watcher }
    }

    /// `None` means "not a command for us"; the transport stays silent.
    pub fn handle(&self, subscriber: SubscriberId, text: &str) -> Option<String> {
        let (cmd, arg) = split_command(text)?;
        let reply = match cmd.as_str() {
            "notify" | "watch" => match self.watcher.watch(subscriber, arg) {
                Ok(WatchOutcome::Started(s)) => format!("🔍 Watching for '{}'...", s.query.raw()),
                Ok(WatchOutcome::AlreadyWatching(s)) => {
                    format!("👀 Already watching for '{}'.", s.query.raw())
                }
                Err(CommandError::EmptyQuery) => USAGE.to_string(),
            },
            "stop" | "cancel" | "unwatch" => {
                let named = Query::parse(arg);
                let n = self.watcher.cancel(&subscriber, Some(arg));
                match (named, n) {
                    (Some(q), 0) => format!("You're not watching '{}'.", q.raw()),
                    (Some(q), _) => format!("🛑 Stopped watching '{}'.", q.raw()),
                    (None, 0) => "You have no active watches.".to_string(),
                    (None, 1) => "🛑 Stopped 1 watch.".to_string(),
                    (None, n) => format!("🛑 Stopped {n} watches."),
                }
            }
            "list" => {
                let subs = self.watcher.list(&subscriber);
                if subs.is_empty() {
                    "You have no active watches.".to_string()
                } else {
                    let lines: Vec<String> =
                        subs.iter().map(|s| format!("• {}", s.query.raw())).collect();
                    format!("Watching:\n{}", lines.join("\n"))
                }
            }
            "start" | "help" => HELP.to_string(),
            _ => return None,
        };
        Some(reply)
    }
}

/// `"/Notify@my_bot  Animal "` -> `("notify", "Animal")`.
fn split_command(text: &str) -> Option<(String, &str)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let (head, arg) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim()),
        None => (rest, ""),
    };
    let cmd = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    if cmd.is_empty() {
        return None;
    }
    Some((cmd, arg))
}
