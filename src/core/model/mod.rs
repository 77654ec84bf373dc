pub mod id;
pub mod registry;

pub use id::{derive_model_id, model_name_from_path};
pub use registry::{LoadOptions, ModelRegistry};

use crate::core::adapter::{LoadedModel, ModelSession, TokenizerHandle};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub type ModelId = String;

/// Shared handle to a registered model.
pub type ModelHandle = Arc<ModelEntity>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub quantization: Option<String>,
    pub context_size: Option<usize>,
    pub low_memory: bool,
    /// Caller-supplied entries beyond the well-known fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    pub fn for_path(path: &str) -> Self {
        Self {
            name: model_name_from_path(path),
            created_at: Utc::now(),
            quantization: None,
            context_size: None,
            low_memory: false,
            extra: HashMap::new(),
        }
    }
}

/// Public snapshot of a model, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub path: String,
    pub metadata: ModelMetadata,
    pub is_loaded: bool,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug)]
struct EntityState {
    session: Option<ModelSession>,
    tokenizer: Option<TokenizerHandle>,
    last_used_at: DateTime<Utc>,
}

/// One model known to the registry.
///
/// Identity and metadata are fixed at creation. The session, tokenizer and
/// usage timestamp change over the model's life and sit behind a lock that is
/// only held for field access.
#[derive(Debug)]
pub struct ModelEntity {
    id: ModelId,
    path: String,
    metadata: ModelMetadata,
    state: RwLock<EntityState>,
}

impl ModelEntity {
    /// Creates an entity in the unloaded state.
    pub fn new(id: impl Into<ModelId>, path: impl Into<String>, metadata: ModelMetadata) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            metadata,
            state: RwLock::new(EntityState {
                session: None,
                tokenizer: None,
                last_used_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn session(&self) -> Option<ModelSession> {
        self.state.read().session.clone()
    }

    pub fn tokenizer(&self) -> Option<TokenizerHandle> {
        self.state.read().tokenizer.clone()
    }

    /// Loaded means the adapter produced a session that has not been freed.
    pub fn is_loaded(&self) -> bool {
        self.state.read().session.is_some()
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.state.read().last_used_at
    }

    /// Bumps the usage timestamp. Successive calls always move it forward,
    /// even when the clock has not advanced.
    pub fn touch(&self) -> DateTime<Utc> {
        let mut state = self.state.write();
        let now = Utc::now();
        state.last_used_at = if now > state.last_used_at {
            now
        } else {
            state.last_used_at + Duration::microseconds(1)
        };
        state.last_used_at
    }

    pub(crate) fn attach(&self, loaded: LoadedModel) {
        let mut state = self.state.write();
        state.session = Some(loaded.session);
        state.tokenizer = loaded.tokenizer;
    }

    pub(crate) fn detach(&self) {
        let mut state = self.state.write();
        state.session = None;
        state.tokenizer = None;
    }

    pub fn info(&self) -> ModelInfo {
        let state = self.state.read();
        ModelInfo {
            id: self.id.clone(),
            path: self.path.clone(),
            metadata: self.metadata.clone(),
            is_loaded: state.session.is_some(),
            last_used_at: state.last_used_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_is_unloaded() {
        let entity = ModelEntity::new("m-1", "/models/m.gguf", ModelMetadata::for_path("/models/m.gguf"));
        assert!(!entity.is_loaded());
        assert!(entity.session().is_none());
        assert_eq!(entity.name(), "m.gguf");
    }

    #[test]
    fn test_attach_and_detach() {
        let entity = ModelEntity::new("m-1", "m.gguf", ModelMetadata::for_path("m.gguf"));
        entity.attach(LoadedModel::new(ModelSession::new("ctx")).with_tokenizer(TokenizerHandle::new(1u8)));
        assert!(entity.is_loaded());
        assert!(entity.tokenizer().is_some());
        assert!(entity.info().is_loaded);

        entity.detach();
        assert!(!entity.is_loaded());
        assert!(entity.tokenizer().is_none());
    }

    #[test]
    fn test_touch_is_strictly_increasing() {
        let entity = ModelEntity::new("m-1", "m.gguf", ModelMetadata::for_path("m.gguf"));
        let mut previous = entity.last_used_at();
        for _ in 0..1000 {
            let next = entity.touch();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_metadata_extra_is_flattened() {
        let mut metadata = ModelMetadata::for_path("a/b/llama.gguf");
        metadata.extra.insert("family".into(), serde_json::json!("llama"));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["family"], "llama");
        assert_eq!(value["name"], "llama.gguf");
    }
}
