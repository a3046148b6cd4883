//! # Configuration Manager
//!
//! Owns the active snapshot and coordinates load, reload, change
//! notification and shutdown.
//!
//! ## Lifecycle
//! `Unloaded -> Loaded -> Closed`. A failed reload leaves the manager in
//! `Loaded` with the previous snapshot still active.
//!
//! ## Concurrency
//! - [`ConfigManager::get`] never blocks; it reads the snapshot store
//! - Load and reload are serialized by one async mutex
//! - Callbacks run after the reload lock is released, one after another.
//!   A notify lock taken before the reload lock is dropped keeps
//!   notifications in publish order across concurrent reloads
//! - File change signals are debounced before a reload is attempted

use crate::config::Config;
use crate::error::ConfigError;
use crate::loader::{ConfigLoader, Metadata};
use crate::precedence::flatten;
use crate::source::{ChangeCallback, EnvSource, Source, SourceType};
use crate::store::SnapshotStore;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay between a change signal and the reload it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Callback invoked with each newly published snapshot.
pub type ConfigCallback = Arc<dyn Fn(Arc<Config>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub debounce: Duration,

    /// Environment tier applied on every load; `None` disables it.
    /// Defaults to the live process environment.
    pub environment: Option<EnvSource>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            environment: Some(EnvSource::new()),
        }
    }
}

/// One line of a provenance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvenanceEntry {
    pub key_path: String,
    pub source: SourceType,
    /// Display form; sensitive values show the redaction marker.
    pub value: String,
}

struct ManagerInner {
    loader: ConfigLoader,
    store: SnapshotStore<Config>,
    state: Mutex<LifecycleState>,
    sources: Mutex<Vec<Arc<dyn Source>>>,
    callbacks: Mutex<Vec<ConfigCallback>>,
    reload_lock: tokio::sync::Mutex<()>,
    notify_lock: tokio::sync::Mutex<()>,
    debounce: Mutex<Duration>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Thread-safe handle to the configuration lifecycle.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Keeps exactly one validated snapshot active, rebuilds it from the
/// registered sources on reload, and notifies subscribers when it changes.
///
/// ## Usage
/// ```rust,no_run
/// use strata_config::{ConfigManager, FileSource, Source};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     // Reads the process environment on every load.
///     let manager = ConfigManager::new();
///     manager.on_change(|config| println!("port is now {}", config.server.port));
///
///     let sources: Vec<Arc<dyn Source>> = vec![Arc::new(FileSource::new("strata.yaml"))];
///     let config = manager.load(sources).await?;
///     println!("listening on {}:{}", config.server.host, config.server.port);
///
///     manager.close().await?;
///     Ok(())
/// }
/// ```
///
/// ## Reload Semantics
/// - Failure returns the error and keeps the current snapshot
/// - A structurally equal result is still swapped in, but no callback runs
/// - A different result is swapped in and every callback registered before
///   the swap is invoked with it
///
/// Handles are cheap to clone and share one underlying manager.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ManagerInner>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("state", &self.state())
            .field("debounce", &self.debounce())
            .finish_non_exhaustive()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_options(ManagerOptions::default())
    }

    pub fn with_options(options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                loader: ConfigLoader::with_environment(options.environment),
                store: SnapshotStore::new(),
                state: Mutex::new(LifecycleState::Unloaded),
                sources: Mutex::new(Vec::new()),
                callbacks: Mutex::new(Vec::new()),
                reload_lock: tokio::sync::Mutex::new(()),
                notify_lock: tokio::sync::Mutex::new(()),
                debounce: Mutex::new(options.debounce),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Builds a manager holding the built-in defaults, without sources,
    /// environment or background tasks. Usable outside an async runtime.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let manager = Self::with_options(ManagerOptions {
            environment: None,
            ..ManagerOptions::default()
        });
        let config = manager.inner.loader.load(&[])?;
        *manager.inner.state.lock() = LifecycleState::Loaded;
        manager.inner.store.swap(Arc::new(config));
        Ok(manager)
    }

    fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    pub fn debounce(&self) -> Duration {
        *self.inner.debounce.lock()
    }

    /// Changes the debounce delay; applies to the next change signal.
    pub fn set_debounce(&self, debounce: Duration) {
        *self.inner.debounce.lock() = debounce;
    }

    /// Active snapshot, or `None` before the first successful load.
    pub fn get(&self) -> Option<Arc<Config>> {
        self.inner.store.get()
    }

    /// Source that last set `key_path`.
    pub fn get_source(&self, key_path: &str) -> SourceType {
        self.inner.loader.source_of(key_path)
    }

    pub fn metadata(&self) -> Metadata {
        self.inner.loader.metadata()
    }

    /// Validates an arbitrary snapshot with the same rules as the pipeline.
    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        self.inner.loader.validate(config)
    }

    /// Registers a callback for future snapshot changes.
    ///
    /// The callback only ever receives snapshots published after it was
    /// registered.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(Arc<Config>) + Send + Sync + 'static,
    {
        self.inner.callbacks.lock().push(Arc::new(callback));
    }

    /// Runs the pipeline once, publishes the snapshot and starts watching.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// First transition out of `Unloaded`. The source list is kept for every
    /// later reload.
    ///
    /// ## Error Handling
    /// - `InvalidState` if already loaded
    /// - `Closed` if the manager was closed
    /// - Any pipeline error; the manager stays `Unloaded`
    ///
    /// Watch setup failures are logged and do not fail the load.
    pub async fn load(&self, sources: Vec<Arc<dyn Source>>) -> Result<Arc<Config>, ConfigError> {
        let (config, targets, _notify_guard) = {
            let _guard = self.inner.reload_lock.lock().await;
            match self.state() {
                LifecycleState::Unloaded => {}
                LifecycleState::Closed => return Err(ConfigError::Closed),
                state @ LifecycleState::Loaded => {
                    return Err(ConfigError::InvalidState {
                        operation: "load",
                        state,
                    });
                }
            }

            let config = Arc::new(self.inner.loader.load(&sources)?);

            {
                let mut state = self.inner.state.lock();
                if *state == LifecycleState::Closed {
                    return Err(ConfigError::Closed);
                }
                *state = LifecycleState::Loaded;
            }
            let targets = self.publish(&config, true);
            *self.inner.sources.lock() = sources.clone();

            self.start_watching(&sources).await;
            (config, targets, self.inner.notify_lock.lock().await)
        };

        notify(&targets, &config);
        Ok(config)
    }

    /// Rebuilds the snapshot from the stored sources.
    ///
    /// Concurrent calls queue on the reload lock. On failure the current
    /// snapshot stays active and the error is returned.
    ///
    /// Callbacks see snapshots in the order they were published: the next
    /// reload may publish while callbacks still run, but its own callbacks
    /// wait for these to finish.
    pub async fn reload(&self) -> Result<Arc<Config>, ConfigError> {
        let (config, targets, _notify_guard) = {
            let _guard = self.inner.reload_lock.lock().await;
            match self.state() {
                LifecycleState::Loaded => {}
                LifecycleState::Closed => return Err(ConfigError::Closed),
                state @ LifecycleState::Unloaded => {
                    return Err(ConfigError::InvalidState {
                        operation: "reload",
                        state,
                    });
                }
            }

            let sources = self.inner.sources.lock().clone();
            let next = match self.inner.loader.load(&sources) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "Configuration reload failed, keeping current snapshot");
                    return Err(e);
                }
            };

            let changed = self.inner.store.get().as_deref() != Some(&next);
            let config = Arc::new(next);
            let targets = self.publish(&config, changed);
            info!(changed, "Configuration reloaded");
            (config, targets, self.inner.notify_lock.lock().await)
        };

        notify(&targets, &config);
        Ok(config)
    }

    /// Swaps `config` in and returns the callbacks to invoke.
    ///
    /// The callback list is read under its lock across the swap, so a
    /// callback registered after the swap never receives this snapshot.
    fn publish(&self, config: &Arc<Config>, changed: bool) -> Vec<ConfigCallback> {
        let callbacks = self.inner.callbacks.lock();
        self.inner.store.swap(Arc::clone(config));
        if changed {
            callbacks.clone()
        } else {
            Vec::new()
        }
    }

    async fn start_watching(&self, sources: &[Arc<dyn Source>]) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let on_change: ChangeCallback = Arc::new(move || {
            let _ = trigger_tx.send(());
        });

        for source in sources {
            if let Err(e) = source
                .watch(self.inner.cancel.child_token(), Arc::clone(&on_change))
                .await
            {
                warn!(source = %source.describe(), error = %e, "Failed to watch configuration source");
            }
        }

        let task = tokio::spawn(debounce_loop(
            Arc::downgrade(&self.inner),
            trigger_rx,
            self.inner.cancel.clone(),
        ));
        self.inner.tasks.lock().push(task);
    }

    /// Stops watching, waits for background tasks and closes every source.
    ///
    /// Idempotent. Returns the first error reported by a source; every
    /// source is closed regardless.
    pub async fn close(&self) -> Result<(), ConfigError> {
        {
            let mut state = self.inner.state.lock();
            if *state == LifecycleState::Closed {
                return Ok(());
            }
            *state = LifecycleState::Closed;
        }
        self.inner.cancel.cancel();

        let _guard = self.inner.reload_lock.lock().await;
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Configuration watch task ended abnormally: {}", e);
            }
        }

        let sources = std::mem::take(&mut *self.inner.sources.lock());
        let mut first_error = None;
        for source in sources {
            if let Err(e) = source.close().await {
                warn!(source = %source.describe(), error = %e, "Failed to close configuration source");
                first_error.get_or_insert(e);
            }
        }
        debug!("Configuration manager closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Every leaf key of the active snapshot with its origin.
    pub fn provenance_report(&self) -> Result<Vec<ProvenanceEntry>, ConfigError> {
        let config = self.get().ok_or(ConfigError::InvalidState {
            operation: "report provenance",
            state: self.state(),
        })?;
        let serialized = match serde_json::to_value(&*config) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConfigError::Decode {
                    errors: vec![crate::error::FieldError::new("<root>", e.to_string())],
                });
            }
        };

        Ok(flatten(&serialized)
            .into_iter()
            .map(|(key_path, value)| ProvenanceEntry {
                source: self.get_source(&key_path),
                value: display_value(&value),
                key_path,
            })
            .collect())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn notify(targets: &[ConfigCallback], config: &Arc<Config>) {
    for callback in targets {
        callback(Arc::clone(config));
    }
}

/// Coalesces bursts of change signals into one reload.
///
/// Each signal restarts the quiet period; the reload runs once no signal
/// has arrived for the configured debounce delay.
async fn debounce_loop(
    manager: Weak<ManagerInner>,
    mut triggers: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    return;
                }
            }
        }

        loop {
            let Some(delay) = manager.upgrade().map(|inner| *inner.debounce.lock()) else {
                return;
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                trigger = triggers.recv() => {
                    if trigger.is_none() {
                        return;
                    }
                }
                () = tokio::time::sleep(delay) => break,
            }
        }

        let Some(inner) = manager.upgrade() else {
            return;
        };
        let manager_handle = ConfigManager::from_inner(inner);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = manager_handle.reload() => {
                if let Err(e) = result {
                    debug!(error = %e, "Debounced reload did not apply");
                }
            }
        }
    }
}
