//! Adapter registry for runtime backend selection
//!
//! Backends are looked up by the `backend` name in [`AdapterConfig`]. The
//! built-in backends are registered on first use; applications can add their
//! own with [`register_adapter`].

use crate::adapter::Adapter;
use crate::config::AdapterConfig;
use crate::error::{Result, TernError};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// Builds an unopened adapter from configuration
pub type AdapterFactory = fn(&AdapterConfig) -> Result<Box<dyn Adapter>>;

#[cfg(feature = "postgres")]
fn postgres_factory(config: &AdapterConfig) -> Result<Box<dyn Adapter>> {
    Ok(Box::new(crate::adapter::postgres::PostgresAdapter::from_config(config)?))
}

#[cfg(feature = "sqlite")]
fn sqlite_factory(config: &AdapterConfig) -> Result<Box<dyn Adapter>> {
    Ok(Box::new(crate::adapter::sqlite::SqliteAdapter::from_config(config)?))
}

#[cfg(any(test, feature = "mock"))]
fn mock_factory(config: &AdapterConfig) -> Result<Box<dyn Adapter>> {
    crate::adapter::tracking::validate_table_name(&config.table)?;
    Ok(Box::new(crate::adapter::mock::MockAdapter::new(config.table.clone())))
}

fn builtin_adapters() -> HashMap<String, AdapterFactory> {
    #[allow(unused_mut)]
    let mut adapters: HashMap<String, AdapterFactory> = HashMap::new();
    #[cfg(feature = "postgres")]
    {
        adapters.insert("postgres".to_string(), postgres_factory);
        adapters.insert("postgresql".to_string(), postgres_factory);
    }
    #[cfg(feature = "sqlite")]
    adapters.insert("sqlite".to_string(), sqlite_factory);
    #[cfg(any(test, feature = "mock"))]
    adapters.insert("mock".to_string(), mock_factory);
    adapters
}

/// Global adapter registry, keyed by lowercase backend name
static ADAPTER_REGISTRY: LazyLock<Mutex<HashMap<String, AdapterFactory>>> =
    LazyLock::new(|| Mutex::new(builtin_adapters()));

fn lock_registry() -> Result<std::sync::MutexGuard<'static, HashMap<String, AdapterFactory>>> {
    ADAPTER_REGISTRY
        .lock()
        .map_err(|e| TernError::Config(format!("Failed to lock adapter registry: {e}")))
}

/// Register a backend under `name` (case-insensitive)
///
/// # Errors
///
/// Returns `TernError::AdapterAlreadyRegistered` if the name is taken.
pub fn register_adapter(name: &str, factory: AdapterFactory) -> Result<()> {
    let name = name.to_lowercase();
    let mut registry = lock_registry()?;
    if registry.contains_key(&name) {
        return Err(TernError::AdapterAlreadyRegistered(name));
    }
    registry.insert(name, factory);
    Ok(())
}

/// Build the adapter named by `config.backend`
///
/// # Errors
///
/// Returns `TernError::UnknownAdapter` for an unregistered name, or whatever
/// the backend's factory rejects in the configuration.
pub fn create_adapter(config: &AdapterConfig) -> Result<Box<dyn Adapter>> {
    let name = config.backend.to_lowercase();
    let factory = {
        let registry = lock_registry()?;
        registry
            .get(&name)
            .copied()
            .ok_or_else(|| TernError::UnknownAdapter(config.backend.clone()))?
    };
    log::debug!("Creating '{name}' adapter for tracking table '{}'", config.table);
    factory(config)
}

/// All registered backend names, sorted
pub fn registered_adapters() -> Result<Vec<String>> {
    let registry = lock_registry()?;
    let mut names: Vec<String> = registry.keys().cloned().collect();
    names.sort_unstable();
    Ok(names)
}
