//! Adapter registry, keyed by adapter id
//!
//! Sources reference adapters by id, so several sources with the same
//! schema (the three Versailles layers) share one adapter.

use super::providers::builtin_adapters;
use super::traits::{AdapterError, AdapterInput, Normalized, SourceAdapter};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Every built-in provider adapter.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for adapter in builtin_adapters() {
            registry.register(adapter);
        }
        registry
    }

    /// Add an adapter, replacing any previous one with the same id.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.insert(adapter.id().to_string(), adapter)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Dispatch a payload to the adapter registered as `adapter_id`.
    pub fn normalize(&self, adapter_id: &str, input: &AdapterInput<'_>) -> Result<Normalized, AdapterError> {
        self.get(adapter_id)
            .ok_or_else(|| AdapterError::UnknownAdapter(adapter_id.to_string()))?
            .normalize(input)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
