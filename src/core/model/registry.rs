use super::{derive_model_id, ModelEntity, ModelHandle, ModelId, ModelInfo, ModelMetadata};
use crate::core::adapter::{Adapter, LoadParams};
use crate::core::context::DEFAULT_CONTEXT_SIZE;
use crate::core::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadOptions {
    /// Explicit id; derived from the path when absent.
    pub model_id: Option<ModelId>,
    pub use_cache: bool,
    pub quantization: Option<String>,
    pub context_size: Option<usize>,
    pub low_memory: bool,
    pub name: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            model_id: None,
            use_cache: true,
            quantization: None,
            context_size: None,
            low_memory: false,
            name: None,
            metadata: HashMap::new(),
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model_id(mut self, id: impl Into<ModelId>) -> Self {
        self.model_id = Some(id.into());
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn quantization(mut self, quantization: impl Into<String>) -> Self {
        self.quantization = Some(quantization.into());
        self
    }

    pub fn context_size(mut self, size: usize) -> Self {
        self.context_size = Some(size);
        self
    }

    pub fn low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Models currently resident in the engine, keyed by id.
///
/// Entries leave only through [`ModelRegistry::unload`] or
/// [`ModelRegistry::clear`]; there is no capacity bound.
pub struct ModelRegistry {
    models: RwLock<HashMap<ModelId, ModelHandle>>,
    default_context_size: usize,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::with_default_context_size(DEFAULT_CONTEXT_SIZE)
    }

    pub fn with_default_context_size(default_context_size: usize) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            default_context_size,
        }
    }

    /// Returns the cached model for `path`, or initializes it through the adapter.
    pub async fn load(&self, path: &str, options: &LoadOptions, adapter: &dyn Adapter) -> Result<ModelHandle> {
        if path.trim().is_empty() {
            return Err(Error::configuration("model path must not be empty"));
        }

        let id = options
            .model_id
            .clone()
            .unwrap_or_else(|| derive_model_id(path));

        if options.use_cache {
            if let Some(cached) = self.models.read().get(&id).cloned() {
                cached.touch();
                tracing::debug!(model_id = %id, "model cache hit");
                return Ok(cached);
            }
        }

        let params = LoadParams {
            quantization: options.quantization.clone(),
            context_size: options.context_size.unwrap_or(self.default_context_size),
            low_memory: options.low_memory,
        };

        let mut metadata = ModelMetadata::for_path(path);
        if let Some(name) = &options.name {
            metadata.name = name.clone();
        }
        metadata.quantization = params.quantization.clone();
        metadata.context_size = Some(params.context_size);
        metadata.low_memory = params.low_memory;
        metadata.extra = options.metadata.clone();

        let entity = Arc::new(ModelEntity::new(id.clone(), path, metadata));

        tracing::info!(model_id = %id, path, adapter = adapter.name(), "initializing model");
        let loaded = adapter
            .initialize_model(path, &params)
            .await
            .map_err(|e| Error::model_load(&id, path, &e))?;
        entity.attach(loaded);
        entity.touch();

        if !options.use_cache {
            return Ok(entity);
        }

        let registered = match self.models.write().entry(id.clone()) {
            Entry::Occupied(existing) => Some(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&entity));
                None
            }
        };

        match registered {
            // Lost a race against a concurrent load of the same id.
            Some(existing) => {
                tracing::debug!(model_id = %id, "model registered concurrently, releasing duplicate");
                release(adapter, &entity).await;
                existing.touch();
                Ok(existing)
            }
            None => Ok(entity),
        }
    }

    /// Frees and removes a model. Returns `false` if the id is unknown.
    pub async fn unload(&self, id: &str, adapter: &dyn Adapter) -> bool {
        let Some(entity) = self.models.write().remove(id) else {
            return false;
        };
        release(adapter, &entity).await;
        tracing::info!(model_id = %id, "model unloaded");
        true
    }

    pub fn get(&self, id: &str) -> Option<ModelHandle> {
        let entity = self.models.read().get(id).cloned()?;
        entity.touch();
        Some(entity)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.read().contains_key(id)
    }

    /// Snapshot of every registered model, most recently used first.
    pub fn list(&self) -> Vec<ModelInfo> {
        let mut infos: Vec<ModelInfo> = self.models.read().values().map(|m| m.info()).collect();
        infos.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        infos
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.models.read().keys().cloned().collect()
    }

    pub async fn clear(&self, adapter: &dyn Adapter) {
        let drained: Vec<ModelHandle> = self.models.write().drain().map(|(_, m)| m).collect();
        for entity in &drained {
            release(adapter, entity).await;
        }
        tracing::info!(count = drained.len(), "model registry cleared");
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn release(adapter: &dyn Adapter, entity: &ModelEntity) {
    if let Err(e) = adapter.free_model(entity).await {
        tracing::warn!(model_id = %entity.id(), error = %format!("{e:#}"), "failed to free model");
    }
    entity.detach();
}
