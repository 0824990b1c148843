//! Provider registry: case-insensitive name lookup and `provider/model`
//! string parsing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::providers::Provider;

/// Registry of configured providers, keyed by lower-cased name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name` (replaces any previous entry).
    pub fn register(&self, name: impl AsRef<str>, provider: Arc<dyn Provider>) {
        self.providers
            .write()
            .expect("provider registry lock poisoned")
            .insert(name.as_ref().to_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, String> {
        self.providers
            .read()
            .expect("provider registry lock poisoned")
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| format!("provider not found: {name}"))
    }

    pub fn list(&self) -> Vec<String> {
        self.providers
            .read()
            .expect("provider registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Split a `provider/model` string. A bare model name yields an empty
/// provider.
pub fn parse_model_string(model_str: &str) -> (String, String) {
    match model_str.split_once('/') {
        Some((provider, model)) => (provider.to_string(), model.to_string()),
        None => (String::new(), model_str.to_string()),
    }
}
