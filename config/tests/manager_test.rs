use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use strata_config::{
    CliSource, ConfigError, ConfigManager, EnvSource, FileSource, KeyMap, LifecycleState,
    ManagerOptions, REDACTION_MARKER, Source, SourceType,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

/// Manager that ignores the process environment.
fn isolated_manager() -> ConfigManager {
    ConfigManager::with_options(ManagerOptions {
        environment: None,
        ..ManagerOptions::default()
    })
}

fn counter(manager: &ConfigManager) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&count);
    manager.on_change(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    count
}

async fn wait_for_port(manager: &ConfigManager, port: i64) {
    timeout(Duration::from_secs(5), async {
        while manager.get().map(|c| c.server.port) != Some(port) {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("port never became {port}"));
}

#[tokio::test]
async fn test_precedence_defaults_file_cli() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager
        .load(vec![
            Arc::new(CliSource::new([("port", json!(6001))])),
            Arc::new(FileSource::new(&path)),
        ])
        .await
        .unwrap();

    let config = manager.get().unwrap();
    assert_eq!(config.server.port, 6001);
    assert_eq!(manager.get_source("server.port"), SourceType::Cli);
    assert_eq!(manager.get_source("server.host"), SourceType::Default);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_env_key_does_not_clobber_file_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  host: file.example.com\n  port: 9090\n");

    let manager = isolated_manager();
    manager
        .load(vec![
            Arc::new(FileSource::new(&path)),
            Arc::new(EnvSource::from_vars([("SERVER_HOST", "env.example.com")])),
        ])
        .await
        .unwrap();

    let config = manager.get().unwrap();
    assert_eq!(config.server.host, "env.example.com");
    assert_eq!(config.server.port, 9090);
    assert_eq!(manager.get_source("server.port"), SourceType::File);
    assert_eq!(manager.get_source("server.host"), SourceType::Env);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_reload_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();
    let calls = counter(&manager);

    write(&path, "server:\n  port: 99999\n");
    let error = manager.reload().await.unwrap_err();
    assert!(error.to_string().starts_with("configuration validation failed"));
    assert!(error.to_string().contains("server.port"));

    assert_eq!(manager.get().unwrap().server.port, 9090);
    assert_eq!(manager.state(), LifecycleState::Loaded);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_timing_violation_names_both_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(
        &path,
        "runtime:\n  dispatcher_heartbeat_interval: 30s\n  dispatcher_heartbeat_ttl: 10s\n",
    );

    let manager = isolated_manager();
    let error = manager
        .load(vec![Arc::new(FileSource::new(&path))])
        .await
        .unwrap_err();

    match &error {
        ConfigError::CrossField { violations } => {
            let message = violations
                .iter()
                .find(|v| v.contains("heartbeat TTL"))
                .unwrap();
            assert!(message.contains("runtime.dispatcher_heartbeat_ttl=10s"));
            assert!(message.contains("runtime.dispatcher_heartbeat_interval=30s"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(manager.get().is_none());
    assert_eq!(manager.state(), LifecycleState::Unloaded);
}

#[tokio::test]
async fn test_identical_reload_invokes_no_callbacks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();
    let calls = counter(&manager);

    manager.reload().await.unwrap();
    manager.reload().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_secret_never_appears_in_rendered_output() {
    let manager = isolated_manager();
    manager
        .load(vec![Arc::new(EnvSource::from_vars([("LLM_API_KEY", "sk-test-123")]))])
        .await
        .unwrap();
    let config = manager.get().unwrap();

    assert_eq!(config.llm.api_key.expose_secret(), "sk-test-123");
    assert!(!format!("{config:?}").contains("sk-test-123"));
    let serialized = serde_json::to_string(&*config).unwrap();
    assert!(!serialized.contains("sk-test-123"));
    assert!(serialized.contains(REDACTION_MARKER));

    let report = manager.provenance_report().unwrap();
    assert!(report.iter().all(|entry| !entry.value.contains("sk-test-123")));
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_file_change_triggers_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager.set_debounce(Duration::from_millis(10));
    let calls = counter(&manager);
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Give the OS watch a moment to settle before writing.
    sleep(Duration::from_millis(50)).await;
    write(&path, "server:\n  port: 9191\n");

    wait_for_port(&manager, 9191).await;
    assert!(calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(manager.get_source("server.port"), SourceType::File);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_burst_of_writes_reloads_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager.set_debounce(Duration::from_millis(300));
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();
    let calls = counter(&manager);
    sleep(Duration::from_millis(50)).await;

    for port in [9091, 9092, 9093] {
        write(&path, &format!("server:\n  port: {port}\n"));
        sleep(Duration::from_millis(20)).await;
    }

    wait_for_port(&manager, 9093).await;
    sleep(Duration::from_millis(400)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_no_reload_after_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "server:\n  port: 9090\n");

    let manager = isolated_manager();
    manager.set_debounce(Duration::from_millis(10));
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();
    let calls = counter(&manager);

    manager.close().await.unwrap();
    write(&path, "server:\n  port: 9191\n");
    sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.get().unwrap().server.port, 9090);
    assert!(matches!(manager.reload().await, Err(ConfigError::Closed)));
}

#[tokio::test]
async fn test_close_is_idempotent_and_prompt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata.yaml");
    write(&path, "mode: memory\n");

    let manager = isolated_manager();
    manager.load(vec![Arc::new(FileSource::new(&path))]).await.unwrap();

    timeout(Duration::from_secs(2), async {
        manager.close().await.unwrap();
        manager.close().await.unwrap();
    })
    .await
    .unwrap();
    assert_eq!(manager.state(), LifecycleState::Closed);
}

/// Source publishing `server.port` and `mcp_proxy.port` with the same value.
struct PairedSource {
    value: AtomicI64,
}

#[async_trait]
impl Source for PairedSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let value = self.value.load(Ordering::SeqCst);
        let mut data = KeyMap::new();
        data.insert("server".to_string(), json!({ "port": value }));
        data.insert("mcp_proxy".to_string(), json!({ "port": value }));
        Ok(data)
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_mixed_snapshots() {
    let source = Arc::new(PairedSource {
        value: AtomicI64::new(2000),
    });
    let manager = isolated_manager();
    manager
        .load(vec![Arc::clone(&source) as Arc<dyn Source>])
        .await
        .unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let config = manager.get().unwrap();
                    assert_eq!(config.server.port, config.mcp_proxy.port);
                }
            })
        })
        .collect();

    for value in 2001..2200 {
        source.value.store(value, Ordering::SeqCst);
        manager.reload().await.unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(manager.get().unwrap().server.port, 2199);
    manager.close().await.unwrap();
}

#[tokio::test]
async fn test_callback_registered_later_sees_only_later_snapshots() {
    let source = Arc::new(PairedSource {
        value: AtomicI64::new(3000),
    });
    let manager = isolated_manager();
    manager
        .load(vec![Arc::clone(&source) as Arc<dyn Source>])
        .await
        .unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.on_change(move |config| sink.lock().push(config.server.port));

    source.value.store(3001, Ordering::SeqCst);
    manager.reload().await.unwrap();
    assert_eq!(*seen.lock(), vec![3001]);
    manager.close().await.unwrap();
}

/// Each load yields the next port, so ports encode publish order.
struct SequenceSource {
    next: AtomicI64,
}

#[async_trait]
impl Source for SequenceSource {
    fn load(&self) -> Result<KeyMap, ConfigError> {
        let port = self.next.fetch_add(1, Ordering::SeqCst);
        let mut data = KeyMap::new();
        data.insert("server".to_string(), json!({ "port": port }));
        Ok(data)
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reloads_notify_in_publish_order() {
    let manager = isolated_manager();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.on_change(move |config| {
        // Slow subscriber widens the window for a later reload to overtake.
        std::thread::sleep(Duration::from_millis(2));
        sink.lock().push(config.server.port);
    });
    manager
        .load(vec![Arc::new(SequenceSource {
            next: AtomicI64::new(4000),
        })])
        .await
        .unwrap();

    let reloads: Vec<_> = (0..32)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reload().await })
        })
        .collect();
    for reload in reloads {
        reload.await.unwrap().unwrap();
    }

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 33);
    assert!(
        seen.windows(2).all(|pair| pair[0] < pair[1]),
        "callbacks ran out of order: {seen:?}"
    );
    assert_eq!(manager.get().unwrap().server.port, 4032);
    manager.close().await.unwrap();
}
