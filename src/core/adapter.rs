//! Capability contract between the orchestrator and an inference engine.
//!
//! An [`Adapter`] owns everything engine specific: sessions, tokenizers,
//! sampling. The core only threads handles and token ids through it.

use crate::core::cancel::CancelProbe;
use crate::core::context::ModelContext;
use crate::core::model::ModelEntity;
use crate::core::options::GenerationOptions;
use crate::core::TokenId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Adapter results carry opaque engine errors.
pub type AdapterResult<T> = anyhow::Result<T>;

#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize_model(&self, path: &str, params: &LoadParams) -> AdapterResult<LoadedModel>;

    async fn tokenize(&self, model: &ModelEntity, text: &str) -> AdapterResult<Vec<TokenId>>;

    async fn detokenize(&self, model: &ModelEntity, tokens: &[TokenId]) -> AdapterResult<String>;

    async fn detokenize_token(&self, model: &ModelEntity, token: TokenId) -> AdapterResult<String>;

    /// Generates up to `options.max_tokens` tokens after `context`. A limit of
    /// zero or less must yield no tokens. Implementations should poll `probe`
    /// between tokens and stop early once it reports cancellation.
    async fn run_inference(
        &self,
        model: &ModelEntity,
        context: &ModelContext,
        options: &GenerationOptions,
        probe: &CancelProbe,
    ) -> AdapterResult<Vec<TokenId>>;

    /// Streaming variant of [`Adapter::run_inference`]: every token is pushed
    /// into `sink` before the call returns.
    async fn run_inference_streaming(
        &self,
        model: &ModelEntity,
        context: &ModelContext,
        options: &GenerationOptions,
        sink: TokenSink,
        probe: &CancelProbe,
    ) -> AdapterResult<()>;

    /// Releases engine resources held by the model's session.
    async fn free_model(&self, _model: &ModelEntity) -> AdapterResult<()> {
        Ok(())
    }

    /// Optional directory scanning capability.
    fn discovery(&self) -> Option<&dyn ModelDiscovery> {
        None
    }
}

#[async_trait]
pub trait ModelDiscovery: Send + Sync {
    async fn discover_models(&self, directory: &Path) -> AdapterResult<Vec<ModelDescriptor>>;
}

/// Parameters forwarded to [`Adapter::initialize_model`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    pub quantization: Option<String>,
    pub context_size: usize,
    pub low_memory: bool,
}

/// What an adapter hands back after a successful load.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub session: ModelSession,
    pub tokenizer: Option<TokenizerHandle>,
}

impl LoadedModel {
    pub fn new(session: ModelSession) -> Self {
        Self {
            session,
            tokenizer: None,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerHandle) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }
}

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Arc<dyn Any + Send + Sync>);

        impl $name {
            pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
                Self(Arc::new(inner))
            }

            /// Only the adapter that created the handle knows `T`.
            pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
                self.0.downcast_ref::<T>()
            }

            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

opaque_handle!(
    /// Engine session owned by the adapter.
    ModelSession
);

opaque_handle!(
    /// Tokenizer capability produced alongside a session.
    TokenizerHandle
);

/// Write end of a streaming generation.
#[derive(Debug, Clone)]
pub struct TokenSink {
    tx: mpsc::UnboundedSender<TokenId>,
}

impl TokenSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TokenId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once nobody is listening anymore.
    pub fn emit(&self, token: TokenId) -> bool {
        self.tx.send(token).is_ok()
    }
}

/// A model file found by [`ModelDiscovery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub format: Option<String>,
}
