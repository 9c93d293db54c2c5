// tests/config_load.rs
use movie_notifier::config::ENV_CONFIG_PATH;
use movie_notifier::{CompletionPolicy, ConfigError, WatchConfig};
use std::{env, fs};

const JSON_CFG: &str = r#"{
  "pollIntervalSeconds": 90,
  "completionPolicy": "allSources",
  "sources": [
    { "name": "A", "urlTemplate": "https://a.example/?s={query}" },
    { "name": "B", "urlTemplate": "https://b.example/search/{query}" }
  ]
}"#;

#[test]
fn from_path_reads_toml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let p_json = dir.path().join("watch.json");
    fs::write(&p_json, JSON_CFG).unwrap();
    let cfg = WatchConfig::from_path(&p_json).unwrap();
    assert_eq!(cfg.poll_interval_seconds, 90);
    assert_eq!(cfg.completion_policy, CompletionPolicy::AllSources);
    assert_eq!(cfg.sources.len(), 2);

    let p_toml = dir.path().join("watch.toml");
    fs::write(
        &p_toml,
        r#"
[[sources]]
name = "Only"
urlTemplate = "https://only.example/"
"#,
    )
    .unwrap();
    let cfg = WatchConfig::from_path(&p_toml).unwrap();
    assert_eq!(cfg.poll_interval_seconds, 120);
    assert_eq!(cfg.per_source_timeout_seconds, 10);
    assert_eq!(cfg.completion_policy, CompletionPolicy::FirstHit);
}

#[test]
fn missing_sources_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("watch.toml");
    fs::write(&p, "pollIntervalSeconds = 30\n").unwrap();
    assert!(matches!(
        WatchConfig::from_path(&p),
        Err(ConfigError::Invalid { ref key, .. }) if key == "sources"
    ));
}

#[serial_test::serial]
#[test]
fn load_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ doesn't leak in.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var("POLL_INTERVAL_SECS");
    env::remove_var("COMPLETION_POLICY");
    env::remove_var("PER_SOURCE_TIMEOUT_SECS");

    // 1) nothing anywhere -> Missing
    assert!(matches!(WatchConfig::load(), Err(ConfigError::Missing)));

    // 2) fallback JSON in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("watch.json"), JSON_CFG).unwrap();
    assert_eq!(WatchConfig::load().unwrap().poll_interval_seconds, 90);

    // 3) env override on top of the file
    env::set_var("POLL_INTERVAL_SECS", "15");
    assert_eq!(WatchConfig::load().unwrap().poll_interval_seconds, 15);
    env::remove_var("POLL_INTERVAL_SECS");

    // 4) explicit path wins, and a dangling one is an error
    let p_env = tmp.path().join("other.toml");
    fs::write(
        &p_env,
        "[[sources]]\nname = \"X\"\nurlTemplate = \"https://x.example/{query}\"\n",
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(WatchConfig::load().unwrap().sources[0].name, "X");
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
    assert!(matches!(WatchConfig::load(), Err(ConfigError::NotFound(_))));
    env::remove_var(ENV_CONFIG_PATH);

    env::set_current_dir(&old).unwrap();
}
