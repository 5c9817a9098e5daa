use std::collections::HashMap;
use std::sync::Arc;

use super::{AuthError, ProviderClient, ProviderRegistry, Result};

/// Map of provider names to clients.
#[derive(Clone, Default)]
pub struct Providers {
    clients: HashMap<String, Arc<dyn ProviderClient>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) -> &mut Self {
        self.clients.insert(client.name().to_string(), client);
        self
    }

    /// Builder-style variant of [`Providers::register`].
    pub fn with(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    /// Names of all registered providers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl ProviderRegistry for Providers {
    fn lookup(&self, name: &str) -> Result<Arc<dyn ProviderClient>> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::ProviderNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("names", &self.names())
            .finish()
    }
}
