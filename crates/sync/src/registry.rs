//! Name to adapter lookup, so new targets never touch the orchestrator.

use crate::adapters::{CodexAdapter, GeminiAdapter, OpenCodeAdapter, TargetAdapter};
use crate::error::SyncError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds an adapter on demand.
pub type AdapterFactory = Box<dyn Fn() -> Arc<dyn TargetAdapter> + Send + Sync>;

/// Builds an adapter writing under the given home directory.
pub type HomedFactory = Box<dyn Fn(&Path) -> Arc<dyn TargetAdapter> + Send + Sync>;

enum Factory {
    Fixed(AdapterFactory),
    Homed(HomedFactory),
}

/// Registered targets, iterated in name order.
#[derive(Default)]
pub struct AdapterRegistry {
    home: PathBuf,
    factories: BTreeMap<String, Factory>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("targets", &self.list())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding codex, gemini and opencode, writing under `home`.
    pub fn with_defaults(home: impl Into<PathBuf>) -> Self {
        let mut registry = Self {
            home: home.into(),
            ..Self::default()
        };
        registry.register_homed("codex", |home| Arc::new(CodexAdapter::new(home)));
        registry.register_homed("gemini", |home| Arc::new(GeminiAdapter::new(home)));
        registry.register_homed("opencode", |home| Arc::new(OpenCodeAdapter::new(home)));
        registry
    }

    /// Registers (or replaces) the factory for `name`.
    pub fn register<F, A>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<A> + Send + Sync + 'static,
        A: TargetAdapter + 'static,
    {
        self.factories.insert(
            name.into(),
            Factory::Fixed(Box::new(move || -> Arc<dyn TargetAdapter> { factory() })),
        );
    }

    /// Registers a factory that can build the adapter under any home directory,
    /// which lets dry runs render into a scratch copy of the target.
    pub fn register_homed<F, A>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Path) -> Arc<A> + Send + Sync + 'static,
        A: TargetAdapter + 'static,
    {
        self.factories.insert(
            name.into(),
            Factory::Homed(Box::new(move |home| -> Arc<dyn TargetAdapter> { factory(home) })),
        );
    }

    /// Registers an already-built adapter under its own name.
    pub fn register_instance(&mut self, adapter: Arc<dyn TargetAdapter>) {
        let name = adapter.name().to_string();
        self.factories
            .insert(name, Factory::Fixed(Box::new(move || Arc::clone(&adapter))));
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn TargetAdapter>, SyncError> {
        match self.factories.get(name) {
            Some(Factory::Fixed(factory)) => Ok(factory()),
            Some(Factory::Homed(factory)) => Ok(factory(&self.home)),
            None => Err(SyncError::TargetNotFound {
                name: name.to_string(),
                available: self.list().join(", "),
            }),
        }
    }

    /// The adapter for `name` writing under `home` instead of the registry's home.
    /// `None` for adapters registered without a homed factory.
    pub fn get_under(&self, name: &str, home: &Path) -> Option<Arc<dyn TargetAdapter>> {
        match self.factories.get(name)? {
            Factory::Homed(factory) => Some(factory(home)),
            Factory::Fixed(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
