//! The database context: named clients, the model registry and configuration.
//!
//! A [`Database`] is constructed once and passed (by reference) to whatever
//! needs it. Clients are looked up by name at the moment of each call, so
//! [`Database::replace_client`] is immediately visible to every model using
//! that name. The model registry only grows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rowbind_core::{Connection, Error, ModelDescriptor, Result};

use crate::config::EngineConfig;
use crate::engine::ModelHandle;
use crate::n1_detection::{N1QueryTracker, N1Stats};

/// Registry key: `(namespace, model name)`.
type ModelKey = (Option<String>, String);

/// Clients, models and configuration for one application.
#[derive(Debug)]
pub struct Database<C> {
    config: EngineConfig,
    clients: RwLock<HashMap<String, Arc<C>>>,
    models: RwLock<HashMap<ModelKey, Arc<ModelDescriptor>>>,
    n1: Mutex<N1QueryTracker>,
}

impl<C: Connection> Default for Database<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> Database<C> {
    /// An empty context with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An empty context with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let n1 = N1QueryTracker::new().with_threshold(config.n1_threshold);
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            models: RwLock::new(HashMap::new()),
            n1: Mutex::new(n1),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Clients
    // ========================================================================

    /// Register a client under `name`. Fails if the name is taken.
    pub fn register_client(&self, name: impl Into<String>, client: C) -> Result<()> {
        let name = name.into();
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if clients.contains_key(&name) {
            return Err(Error::custom(format!("client '{name}' is already registered")));
        }
        tracing::debug!(client = %name, "registered client");
        clients.insert(name, Arc::new(client));
        Ok(())
    }

    /// Register or swap the client under `name`, returning the previous one.
    pub fn replace_client(&self, name: impl Into<String>, client: C) -> Option<Arc<C>> {
        let name = name.into();
        tracing::info!(client = %name, "replacing client");
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(client))
    }

    /// The client currently registered under `name`.
    pub fn client(&self, name: &str) -> Result<Arc<C>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownClient(name.to_string()))
    }

    // ========================================================================
    // Models
    // ========================================================================

    /// Add a descriptor to the registry.
    ///
    /// Fails if a model with the same namespace and name is already defined.
    pub fn define(&self, descriptor: ModelDescriptor) -> Result<Arc<ModelDescriptor>> {
        let key = (
            descriptor.namespace().map(str::to_string),
            descriptor.name().to_string(),
        );
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(&key) {
            return Err(Error::custom(format!(
                "model '{}' is already defined{}",
                key.1,
                key.0
                    .as_deref()
                    .map(|ns| format!(" in namespace '{ns}'"))
                    .unwrap_or_default()
            )));
        }
        tracing::debug!(
            model = descriptor.name(),
            table = descriptor.table_name(),
            "defined model"
        );
        let descriptor = Arc::new(descriptor);
        models.insert(key, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Find a descriptor by namespace and name.
    pub fn lookup(&self, namespace: Option<&str>, name: &str) -> Result<Arc<ModelDescriptor>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.map(str::to_string), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::UnknownModel {
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            })
    }

    /// Operations for a model in the default namespace.
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_, C>> {
        Ok(ModelHandle::new(self, self.lookup(None, name)?))
    }

    /// Operations for a namespaced model.
    pub fn model_in(&self, namespace: &str, name: &str) -> Result<ModelHandle<'_, C>> {
        Ok(ModelHandle::new(self, self.lookup(Some(namespace), name)?))
    }

    // ========================================================================
    // N+1 detection
    // ========================================================================

    pub(crate) fn record_lookup(&self, model: &str) {
        self.n1
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_lookup(model);
    }

    /// Single-row lookup statistics since creation or the last reset.
    pub fn n1_stats(&self) -> N1Stats {
        self.n1.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }

    /// Single-row lookups of one model since creation or the last reset.
    pub fn n1_count(&self, model: &str) -> usize {
        self.n1
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count_for(model)
    }

    /// Forget lookup counts (e.g. at the start of a request).
    pub fn reset_n1(&self) {
        self.n1.lock().unwrap_or_else(PoisonError::into_inner).reset();
    }
}
