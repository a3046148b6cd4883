//! # Scoped Manager Access
//!
//! Lookup order for [`current`]:
//! 1. The manager attached to the running task with [`scope`]
//! 2. The process default registered with [`initialize`]
//! 3. A defaults-only manager built on first use
//!
//! Passing a [`ConfigManager`] explicitly is always preferred; this module
//! covers call sites that cannot thread one through.

use crate::error::ConfigError;
use crate::manager::ConfigManager;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::OnceLock;
use tracing::debug;

tokio::task_local! {
    static CURRENT: ConfigManager;
}

static DEFAULT: Mutex<Option<ConfigManager>> = parking_lot::const_mutex(None);
static FALLBACK: OnceLock<ConfigManager> = OnceLock::new();

/// Runs `fut` with `manager` as the current manager for that task.
pub async fn scope<F>(manager: ConfigManager, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(manager, fut).await
}

/// Resolves the manager for the calling task.
pub fn current() -> Result<ConfigManager, ConfigError> {
    if let Ok(manager) = CURRENT.try_with(Clone::clone) {
        return Ok(manager);
    }
    if let Some(manager) = DEFAULT.lock().clone() {
        return Ok(manager);
    }
    if let Some(manager) = FALLBACK.get() {
        return Ok(manager.clone());
    }

    debug!("No configuration manager attached, building defaults-only fallback");
    let manager = ConfigManager::from_defaults()?;
    Ok(FALLBACK.get_or_init(|| manager).clone())
}

/// Registers the process default manager.
///
/// Returns `AlreadyInitialized` if a default is registered and not yet shut
/// down.
pub fn initialize(manager: ConfigManager) -> Result<(), ConfigError> {
    let mut slot = DEFAULT.lock();
    if slot.is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    *slot = Some(manager);
    Ok(())
}

/// Closes and unregisters the process default. A no-op when none is set.
pub async fn shutdown() -> Result<(), ConfigError> {
    let manager = DEFAULT.lock().take();
    match manager {
        Some(manager) => manager.close().await,
        None => Ok(()),
    }
}
