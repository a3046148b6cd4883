//! # Configuration Hot Reload
//!
//! Watches a configuration file and fans change notifications out to every
//! live registration.
//!
//! One OS-level watch and one dispatch task exist per [`FileWatcher`], no
//! matter how many times [`FileWatcher::register`] is called. Each
//! registration carries its own [`CancellationToken`]; a cancelled
//! registration is never invoked again and is dropped as soon as its token
//! fires, even while the OS watch stays up for the others. Debouncing is
//! left to the caller.

use crate::error::ConfigError;
use crate::source::ChangeCallback;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 100;

struct Registration {
    cancel: CancellationToken,
    callback: ChangeCallback,
}

type Registrations = Arc<Mutex<HashMap<u64, Registration>>>;

#[derive(Default)]
struct WatchState {
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

/// Shared watcher for a single configuration file.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Delivers a "file changed" signal to every active registration when the
/// file is written or created.
///
/// ## Usage
/// ```rust,no_run
/// use strata_config::hot_reload::FileWatcher;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), strata_config::ConfigError> {
/// let watcher = FileWatcher::new("strata.yaml");
/// let token = CancellationToken::new();
/// watcher
///     .register(token.clone(), Arc::new(|| println!("changed")))
///     .await?;
///
/// token.cancel();
/// watcher.close().await;
/// # Ok(())
/// # }
/// ```
///
/// ## Details
/// - The parent directory is watched so editors that replace the file by
///   rename are still observed; events for other files are filtered out
/// - Backend errors are logged and the dispatch task keeps running
/// - [`FileWatcher::close`] returns only after the dispatch task has exited
pub struct FileWatcher {
    path: PathBuf,
    registrations: Registrations,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    state: tokio::sync::Mutex<WatchState>,
}

impl FileWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            registrations: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            state: tokio::sync::Mutex::new(WatchState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a registration, starting the OS watch on first use.
    ///
    /// Returns the registration id. The registration stays active until
    /// `cancel` fires or the watcher is closed.
    pub async fn register(
        &self,
        cancel: CancellationToken,
        callback: ChangeCallback,
    ) -> Result<u64, ConfigError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ConfigError::Closed);
        }
        if state.watcher.is_none() {
            self.start(&mut state)?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registrations.lock().insert(
            id,
            Registration {
                cancel: cancel.clone(),
                callback,
            },
        );
        tokio::spawn(remove_on_cancel(
            self.path.clone(),
            id,
            cancel,
            Arc::clone(&self.registrations),
            self.shutdown.clone(),
        ));
        debug!(path = ?self.path, registration = id, "Registered config file watch");
        Ok(id)
    }

    fn start(&self, state: &mut WatchState) -> Result<(), ConfigError> {
        let file_name = self
            .path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| self.setup_error("path has no file name"))?;
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| self.setup_error(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| self.setup_error(format!("failed to watch {}: {e}", directory.display())))?;

        info!("Watching config file: {:?}", self.path);

        state.task = Some(tokio::spawn(dispatch(
            self.path.clone(),
            file_name,
            event_rx,
            Arc::clone(&self.registrations),
            self.shutdown.clone(),
        )));
        state.watcher = Some(watcher);
        Ok(())
    }

    fn setup_error(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::WatchSetup {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Number of registrations that have not been cancelled.
    pub fn active_registrations(&self) -> usize {
        self.registrations
            .lock()
            .values()
            .filter(|registration| !registration.cancel.is_cancelled())
            .count()
    }

    /// Drops every registration, tears down the OS watch and waits for the
    /// dispatch task to exit. Safe to call more than once.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        self.shutdown.cancel();
        self.registrations.lock().clear();
        drop(state.watcher.take());

        if let Some(task) = state.task.take() {
            if let Err(e) = task.await {
                warn!(path = ?self.path, "Config watch task ended abnormally: {}", e);
            }
        }
        debug!(path = ?self.path, "Stopped watching config file");
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(
    path: PathBuf,
    file_name: OsString,
    mut events: mpsc::Receiver<notify::Result<Event>>,
    registrations: Registrations,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    Ok(event) if is_relevant(&event, &file_name) => {
                        debug!(path = ?path, kind = ?event.kind, "Config file changed");
                        notify_registrations(&registrations);
                    }
                    Ok(event) => {
                        debug!("Ignoring event: {:?}", event.kind);
                    }
                    Err(e) => {
                        error!(path = ?path, "Watch error: {}", e);
                    }
                }
            }
        }
    }
}

/// Drops registration `id` once its token fires, releasing the callback
/// without waiting for the next file event.
async fn remove_on_cancel(
    path: PathBuf,
    id: u64,
    cancel: CancellationToken,
    registrations: Registrations,
    shutdown: CancellationToken,
) {
    tokio::select! {
        () = cancel.cancelled() => {
            registrations.lock().remove(&id);
            debug!(path = ?path, registration = id, "Removed cancelled config file watch");
        }
        () = shutdown.cancelled() => {}
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

fn notify_registrations(registrations: &Registrations) {
    let live: Vec<(CancellationToken, ChangeCallback)> = {
        let mut registrations = registrations.lock();
        registrations.retain(|_, registration| !registration.cancel.is_cancelled());
        registrations
            .values()
            .map(|registration| {
                (
                    registration.cancel.clone(),
                    Arc::clone(&registration.callback),
                )
            })
            .collect()
    };

    for (cancel, callback) in live {
        // Cancellation may land between the snapshot and the call.
        if !cancel.is_cancelled() {
            callback();
        }
    }
}
