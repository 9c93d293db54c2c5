// tests/commands.rs
use std::sync::Arc;
use std::time::Duration;

use movie_notifier::commands::{CommandError, USAGE};
use movie_notifier::testing::{hit, sources, RecordingChannel, ScriptedProbe, Step};
use movie_notifier::{
    CommandRouter, CompletionPolicy, MatchAggregator, Scheduler, SchedulerCfg, SubscriberId,
    SubscriptionStore, Watcher,
};

fn watcher(
    probe: &Arc<ScriptedProbe>,
    channel: &Arc<RecordingChannel>,
    probe_on_watch: bool,
) -> Arc<Watcher> {
    let aggregator = MatchAggregator::new(probe.clone(), sources(&["A", "B"]), Duration::from_millis(200));
    let scheduler = Scheduler::new(
        Arc::new(SubscriptionStore::new()),
        aggregator,
        channel.clone(),
        SchedulerCfg {
            interval: Duration::from_secs(60),
            policy: CompletionPolicy::FirstHit,
        },
    );
    Arc::new(Watcher::new(scheduler, probe_on_watch))
}

fn me() -> SubscriberId {
    SubscriberId::from(42i64)
}

#[tokio::test]
async fn notify_replies_and_dedupes_by_normal_form() {
    let w = watcher(&Arc::new(ScriptedProbe::new()), &Arc::new(RecordingChannel::new()), false);
    let router = CommandRouter::new(w.clone());

    assert_eq!(
        router.handle(me(), "/notify The Lion King").as_deref(),
        Some("🔍 Watching for 'The Lion King'...")
    );
    assert_eq!(
        router.handle(me(), "/watch   the lion   KING").as_deref(),
        Some("👀 Already watching for 'The Lion King'.")
    );
    assert_eq!(w.list(&me()).len(), 1);
}

#[tokio::test]
async fn notify_without_name_shows_usage() {
    let w = watcher(&Arc::new(ScriptedProbe::new()), &Arc::new(RecordingChannel::new()), false);
    let router = CommandRouter::new(w.clone());
    assert_eq!(router.handle(me(), "/notify").as_deref(), Some(USAGE));
    assert_eq!(router.handle(me(), "/notify    ").as_deref(), Some(USAGE));
    assert_eq!(w.watch(me(), " \t"), Err(CommandError::EmptyQuery));
    assert!(w.list(&me()).is_empty());
}

#[tokio::test]
async fn stop_list_and_unknown_commands() {
    let w = watcher(&Arc::new(ScriptedProbe::new()), &Arc::new(RecordingChannel::new()), false);
    let router = CommandRouter::new(w.clone());

    router.handle(me(), "/notify Animal");
    router.handle(me(), "/notify Jawan");
    router.handle(me(), "/notify Dunki");
    let list = router.handle(me(), "/list").unwrap();
    assert!(list.contains("• Animal") && list.contains("• Jawan") && list.contains("• Dunki"));

    assert_eq!(router.handle(me(), "/stop animal").as_deref(), Some("🛑 Stopped watching 'animal'."));
    assert_eq!(router.handle(me(), "/stop animal").as_deref(), Some("You're not watching 'animal'."));
    assert_eq!(router.handle(me(), "/stop").as_deref(), Some("🛑 Stopped 2 watches."));
    assert_eq!(router.handle(me(), "/cancel").as_deref(), Some("You have no active watches."));
    assert_eq!(router.handle(me(), "/list").as_deref(), Some("You have no active watches."));

    assert!(router.handle(me(), "/help").unwrap().contains("/notify"));
    assert_eq!(router.handle(me(), "/dance"), None);
    assert_eq!(router.handle(me(), "just chatting"), None);
}

#[tokio::test]
async fn cancel_only_touches_the_caller() {
    let w = watcher(&Arc::new(ScriptedProbe::new()), &Arc::new(RecordingChannel::new()), false);
    w.watch(me(), "Animal").unwrap();
    w.watch(SubscriberId::from(7i64), "Animal").unwrap();
    assert_eq!(w.cancel(&me(), None), 1);
    assert_eq!(w.cancel(&me(), Some("Animal")), 0);
    assert_eq!(w.list(&SubscriberId::from(7i64)).len(), 1);
}

#[tokio::test]
async fn new_watch_gets_an_immediate_background_check() {
    let probe = Arc::new(ScriptedProbe::new());
    let channel = Arc::new(RecordingChannel::new());
    probe.push("A", Step::Found(vec![hit("A", "https://a/animal", "Animal")]));
    let w = watcher(&probe, &channel, true);

    let outcome = w.watch(me(), "Animal").unwrap();
    assert!(outcome.is_new());

    for _ in 0..100 {
        if !channel.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let sent = channel.sent_to(&me());
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("https://a/animal"));
    // firstHit: done already
    assert!(w.list(&me()).is_empty());
}
