//! Integration tests for Livebox

mod pipeline_tests {
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use livebox::{
        AgeValidator, AlwaysValid, BoxError, Config, Fetcher, JsonSerializer, Livebox,
        LiveboxError, LiveboxResult, LocalDataSource, MemoryLruDataSource, MemoryStore,
        RequestKey, RetryPolicy, RetryStrategy, State, StateAdapter,
    };
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serial_test::serial;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
    }

    fn users(ids: &[u32]) -> Vec<User> {
        ids.iter().map(|id| User { id: *id }).collect()
    }

    /// Tier backed by a shared map, so tests can inspect it
    #[derive(Clone)]
    struct MapSource {
        name: &'static str,
        entries: Arc<Mutex<HashMap<String, Vec<User>>>>,
    }

    impl MapSource {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                entries: Arc::default(),
            }
        }

        fn with(self, key: &str, value: Vec<User>) -> Self {
            self.entries.lock().insert(key.to_string(), value);
            self
        }

        fn get(&self, key: &str) -> Option<Vec<User>> {
            self.entries.lock().get(key).cloned()
        }
    }

    #[async_trait]
    impl LocalDataSource<Vec<User>> for MapSource {
        type Output = Vec<User>;

        async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<Vec<User>>> {
            Ok(self.get(key.as_str()))
        }

        async fn save(&self, key: &RequestKey, input: &Vec<User>) -> LiveboxResult<()> {
            self.entries
                .lock()
                .insert(key.to_string(), input.clone());
            Ok(())
        }

        async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
            self.entries.lock().remove(key.as_str());
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    /// Tier whose every operation fails
    struct BrokenSource;

    #[async_trait]
    impl LocalDataSource<Vec<User>> for BrokenSource {
        type Output = Vec<User>;

        async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<Vec<User>>> {
            Err(LiveboxError::tier("broken", "read", key.as_str(), "disk on fire"))
        }

        async fn save(&self, key: &RequestKey, _input: &Vec<User>) -> LiveboxResult<()> {
            Err(LiveboxError::tier("broken", "save", key.as_str(), "disk on fire"))
        }

        async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
            Err(LiveboxError::tier("broken", "clear", key.as_str(), "disk on fire"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn counting_fetcher(
        calls: Arc<AtomicU32>,
        value: Vec<User>,
        delay: Duration,
    ) -> impl Fetcher<Vec<User>> {
        move || {
            let calls = calls.clone();
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok::<_, BoxError>(value)
            }
        }
    }

    fn failing_fetcher(calls: Arc<AtomicU32>, failures: u32) -> impl Fetcher<Vec<User>> {
        move || {
            let calls = calls.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt <= failures {
                    return Err::<Vec<User>, BoxError>(format!("attempt {} failed", attempt).into());
                }
                Ok(users(&[1, 2]))
            }
        }
    }

    async fn init(dir: &TempDir) {
        init_with(Config::in_dir(dir.path())).await;
    }

    async fn init_with(config: Config) {
        livebox::init(config, Arc::new(JsonSerializer::new()))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn concurrent_requests_share_one_fetch() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(
                calls.clone(),
                users(&[1, 2]),
                Duration::from_millis(50),
            ))
            .build()
            .unwrap();

        let (first, second) = tokio::join!(
            livebox.stream().collect::<Vec<_>>(),
            livebox.stream().collect::<Vec<_>>()
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].as_ref().unwrap(), &users(&[1, 2]));
        assert_eq!(second[0].as_ref().unwrap(), &users(&[1, 2]));

        // Completed flights are unregistered, the next call fetches again
        livebox.first().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn stale_first_tier_is_cleared_and_second_tier_wins() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let stale = MapSource::new("stale").with("get_users", users(&[9]));
        let valid = MapSource::new("valid").with("get_users", users(&[1, 2]));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[3]), Duration::ZERO))
            .add_source(stale.clone(), |_: &str, _: &Vec<User>| false)
            .add_source(valid.clone(), AlwaysValid)
            .build()
            .unwrap();

        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(stale.get("get_users").is_none());
        assert_eq!(valid.get("get_users"), Some(users(&[1, 2])));

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn refresh_delivers_local_then_fresh() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let tier = MapSource::new("map").with("get_users", users(&[1]));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[1, 2]), Duration::ZERO))
            .add_source(tier.clone(), AlwaysValid)
            .refresh(true)
            .build()
            .unwrap();

        let values: Vec<Vec<User>> = livebox
            .stream()
            .map(|result| result.unwrap())
            .collect()
            .await;

        assert_eq!(values, vec![users(&[1]), users(&[1, 2])]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tier.get("get_users"), Some(users(&[1, 2])));

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn refresh_without_sources_fetches_once() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[1]), Duration::ZERO))
            .refresh(true)
            .build()
            .unwrap();

        let values: Vec<_> = livebox.stream().collect().await;
        assert_eq!(values.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn ignore_cache_skips_reading_and_saving() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let tier = MapSource::new("map");

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[1]), Duration::ZERO))
            .add_source(tier.clone(), AlwaysValid)
            .ignore_cache(true)
            .refresh(true)
            .build()
            .unwrap();

        livebox.first().await.unwrap();
        livebox.first().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(tier.get("get_users").is_none());

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn interval_retry_recovers() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), 2))
            .retry_policy(RetryPolicy::interval(Duration::from_millis(10)))
            .build()
            .unwrap();

        let values: Vec<_> = livebox.stream().collect().await;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_ref().unwrap(), &users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn exhausted_retries_fail_every_attached_caller() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), u32::MAX))
            .retry_policy(RetryPolicy::interval(Duration::from_millis(20)).max_retries(1))
            .build()
            .unwrap();

        let (first, second) = tokio::join!(livebox.first(), livebox.first());
        let (first, second) = (first.unwrap_err(), second.unwrap_err());

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(first, LiveboxError::Fetch { attempts: 2, .. }));
        assert_eq!(first.to_string(), second.to_string());

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn without_retry_fetch_error_is_immediate() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), 1))
            .build()
            .unwrap();

        let err = livebox.first().await.unwrap_err();
        assert!(matches!(err, LiveboxError::Fetch { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn broken_tier_is_absorbed() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let healthy = MapSource::new("healthy");

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[4]), Duration::ZERO))
            .add_source(BrokenSource, AlwaysValid)
            .add_source(healthy.clone(), AlwaysValid)
            .build()
            .unwrap();

        assert_eq!(livebox.first().await.unwrap(), users(&[4]));
        assert_eq!(healthy.get("get_users"), Some(users(&[4])));

        assert_eq!(livebox.first().await.unwrap(), users(&[4]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn converters_apply_to_fetched_and_cached_values() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let tier = MapSource::new("map");

        let livebox = Livebox::<Vec<User>, Vec<u32>>::builder()
            .with_key("user_ids")
            .fetch(counting_fetcher(calls.clone(), users(&[1, 2]), Duration::ZERO))
            .add_source(tier.clone(), AlwaysValid)
            .add_converter::<Vec<User>, _>(|users: Vec<User>| {
                Some(users.iter().map(|u| u.id).collect::<Vec<u32>>())
            })
            .build()
            .unwrap();

        assert_eq!(livebox.first().await.unwrap(), vec![1, 2]);
        assert_eq!(livebox.first().await.unwrap(), vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn empty_conversion_fails_the_request() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, String>::builder()
            .with_key("user_names")
            .fetch(counting_fetcher(calls.clone(), users(&[1]), Duration::ZERO))
            .add_converter::<Vec<User>, _>(|_: Vec<User>| None::<String>)
            .retry_policy(RetryPolicy::interval(Duration::from_millis(10)))
            .build()
            .unwrap();

        let err = livebox.first().await.unwrap_err();
        assert!(matches!(err, LiveboxError::Converter { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn state_adapter_reports_loading_then_success() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[1]), Duration::ZERO))
            .build()
            .unwrap();

        let states: Vec<State<Vec<User>>> = livebox.adapt(&StateAdapter).collect().await;
        assert_eq!(states.len(), 2);
        assert!(states[0].is_loading());
        assert_eq!(states[1].value(), Some(&users(&[1])));

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn refresh_fetch_failure_follows_local_value() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let tier = MapSource::new("map").with("get_users", users(&[1]));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), u32::MAX))
            .add_source(tier.clone(), AlwaysValid)
            .refresh(true)
            .build()
            .unwrap();

        let results: Vec<_> = livebox.stream().collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &users(&[1]));
        assert!(matches!(
            results[1],
            Err(LiveboxError::Fetch { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tier.get("get_users"), Some(users(&[1])));

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn backoff_retry_uses_configured_schedule() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::in_dir(dir.path());
        config.retry.backoff_base_ms = 5;
        config.retry.backoff_factor = 2;
        config.retry.max_retries = 3;
        init_with(config).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), 3))
            .retry_on_failure(RetryStrategy::Backoff)
            .build()
            .unwrap();

        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        calls.store(0, Ordering::SeqCst);
        let err = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), 4))
            .retry_on_failure(RetryStrategy::Backoff)
            .build()
            .unwrap()
            .first()
            .await
            .unwrap_err();
        assert!(matches!(err, LiveboxError::Fetch { attempts: 4, .. }));

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn unbounded_retry_from_config_runs_until_success() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::in_dir(dir.path());
        config.retry.interval_ms = 1;
        config.retry.max_retries = 1;
        config.retry.unbounded = true;
        init_with(config).await;
        let calls = Arc::new(AtomicU32::new(0));

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(failing_fetcher(calls.clone(), 6))
            .retry_on_failure(RetryStrategy::Interval)
            .build()
            .unwrap();

        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 7);

        livebox::shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn built_request_keeps_its_own_journal_after_reinit() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let tier = MapSource::new("map");

        let livebox = Livebox::<Vec<User>, Vec<User>>::builder()
            .with_key("get_users")
            .fetch(counting_fetcher(calls.clone(), users(&[1]), Duration::ZERO))
            .add_source(tier.clone(), AgeValidator::new(Duration::ZERO))
            .build()
            .unwrap();

        livebox.first().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        livebox.first().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // A fresh context has no entry for the key, but this request still
        // validates against the journal it records into
        init(&other).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        livebox.first().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        livebox::shutdown();
        tokio::time::sleep(Duration::from_millis(5)).await;
        livebox.first().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    #[serial]
    async fn get_users_scenario_with_age_validator() {
        let dir = TempDir::new().unwrap();
        init(&dir).await;
        let calls = Arc::new(AtomicU32::new(0));
        let store = MemoryStore::new(100);

        let build = || {
            Livebox::<Vec<User>, Vec<User>>::builder()
                .with_key("get_users")
                .fetch(counting_fetcher(calls.clone(), users(&[1, 2]), Duration::ZERO))
                .add_source(
                    MemoryLruDataSource::<Vec<User>>::new(store.clone()),
                    AgeValidator::hours(1),
                )
                .build()
                .unwrap()
        };

        // Miss: fetch, populate the tier and the journal
        let livebox = build();
        assert!(livebox.uses_age_validator());
        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let journal = livebox::context::current().unwrap().journal().unwrap();
        assert!(journal.read("get_users").is_some());

        // Within the TTL: served from memory
        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Age the journal entry past the TTL and reopen it
        livebox::shutdown();
        let two_hours_ago = chrono::Utc::now() - chrono::Duration::hours(2);
        std::fs::write(
            dir.path()
                .join("livebox_journal_dir")
                .join(livebox::journal::JOURNAL_FILE),
            format!("get_users:{}\n", two_hours_ago.timestamp_millis()),
        )
        .unwrap();
        init(&dir).await;

        let livebox = build();
        assert_eq!(livebox.first().await.unwrap(), users(&[1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let journal = livebox::context::current().unwrap().journal().unwrap();
        assert!(journal.read("get_users").unwrap() > two_hours_ago);

        livebox::shutdown();
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use livebox::Config;
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn livebox() -> Command {
        cargo_bin_cmd!("livebox")
    }

    /// Write a config rooted in `dir` and return its path
    fn config_in(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = toml::to_string_pretty(&Config::in_dir(&dir.join("cache"))).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        livebox()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("multi-tier read-through cache"));
    }

    #[test]
    fn version_displays() {
        livebox()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("livebox"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        livebox()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        livebox()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[disk_lru]"));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let data = dir.path().join("users.json");
        std::fs::write(&data, "[]").unwrap();

        livebox()
            .arg("--config")
            .arg(&config)
            .args(["get", "Get Users", "--file"])
            .arg(&data)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid key"));
    }

    #[test]
    fn get_serves_from_disk_cache_until_cleared() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let data = dir.path().join("users.json");
        std::fs::write(&data, r#"[{"id":1},{"id":2}]"#).unwrap();

        let get = |extra: &[&str]| {
            let mut cmd = livebox();
            cmd.arg("--config")
                .arg(&config)
                .args(["get", "get_users", "--tier", "disk-lru", "--ttl-minutes", "60", "--file"])
                .arg(&data)
                .args(extra);
            cmd
        };

        get(&[])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"[{"id":1},{"id":2}]"#));

        std::fs::write(&data, r#"[{"id":3}]"#).unwrap();

        // Cached copy is still valid
        get(&[])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"[{"id":1},{"id":2}]"#));

        // Bypassing the cache sees the new file but does not store it
        get(&["--ignore-cache"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"[{"id":3}]"#));

        livebox()
            .arg("--config")
            .arg(&config)
            .args(["journal", "get_users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("get_users"));

        livebox()
            .arg("--config")
            .arg(&config)
            .args(["clear", "get_users"])
            .assert()
            .success();

        get(&[])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"[{"id":3}]"#));
    }

    #[test]
    fn missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());

        livebox()
            .arg("--config")
            .arg(&config)
            .args(["get", "get_users", "--file"])
            .arg(dir.path().join("missing.json"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Fetch failed"));
    }
}
