//! Shared test utilities for integration tests.
//!
//! This module provides common helpers used across integration tests, particularly
//! for environment variable manipulation which requires careful synchronisation.

use std::sync::{Mutex, MutexGuard};

use podwire::config::env_var_names;

/// Global mutex protecting environment variable access.
///
/// `#[serial]` already keeps these tests apart; holding the guard makes the
/// exclusive access visible in test code.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard for exclusive environment variable access.
pub struct EnvGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl EnvGuard<'_> {
    /// Acquire exclusive access to the environment.
    ///
    /// A poisoned lock is still acquired so one failing test does not cascade.
    #[must_use]
    pub fn lock() -> EnvGuard<'static> {
        let guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        EnvGuard { _guard: guard }
    }

    /// Set an environment variable while the guard is held.
    pub fn set(&self, key: &str, value: &str) {
        // SAFETY: The guard guarantees exclusive access to the environment.
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

/// Clears all `PODWIRE_*` environment variables and returns a guard.
///
/// Uses [`env_var_names()`] from the loader to stay in sync with the actual
/// environment variable mappings. Also clears `PODWIRE_CONFIG_PATH`, which is
/// handled by config discovery rather than the mapping table.
#[must_use]
pub fn clear_podwire_env() -> EnvGuard<'static> {
    let guard = EnvGuard::lock();

    // SAFETY: The guard guarantees exclusive access to the environment.
    unsafe {
        std::env::remove_var("PODWIRE_CONFIG_PATH");
    }

    for var in env_var_names() {
        // SAFETY: The guard guarantees exclusive access to the environment.
        unsafe {
            std::env::remove_var(var);
        }
    }

    guard
}
