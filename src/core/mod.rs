pub mod adapter;
pub mod cancel;
pub mod context;
pub mod error;
pub mod model;
pub mod options;
pub mod stream;

pub use adapter::{
    Adapter, AdapterResult, LoadParams, LoadedModel, ModelDescriptor, ModelDiscovery, ModelSession,
    TokenSink, TokenizerHandle,
};
pub use cancel::{AsModelId, CancelProbe, CancellationFlags};
pub use context::ModelContext;
pub use error::{Error, Result};
pub use model::{LoadOptions, ModelEntity, ModelHandle, ModelId, ModelInfo, ModelMetadata, ModelRegistry};
pub use options::GenerationOptions;
pub use stream::{Subscription, TokenStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub i32);

impl From<i32> for TokenId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}
