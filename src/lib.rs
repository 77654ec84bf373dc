pub mod app;
pub mod core;
pub mod envconfig;
pub mod infra;

pub use crate::core::{
    Adapter, AdapterResult, CancelProbe, Error, GenerationOptions, LoadOptions, LoadParams, LoadedModel,
    ModelContext, ModelDescriptor, ModelDiscovery, ModelEntity, ModelHandle, ModelInfo, ModelRegistry,
    ModelSession, Result, TokenId, TokenSink, TokenStream, TokenizerHandle,
};

pub use crate::app::{Event, EventBus, EventHandler, InferenceRunner, Orchestrator, OrchestratorBuilder};

pub use crate::envconfig::OrchestratorConfig;

pub use crate::infra::EchoAdapter;
