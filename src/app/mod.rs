pub mod events;
pub mod runner;

pub use events::{Event, EventBus, EventHandler, LoggingHandler, RecordingHandler};
pub use runner::InferenceRunner;

use crate::core::cancel::{AsModelId, CancellationFlags};
use crate::core::error::{Error, Result};
use crate::core::stream::TokenStream;
use crate::core::{Adapter, GenerationOptions, LoadOptions, ModelDescriptor, ModelEntity, ModelHandle, ModelInfo, ModelRegistry};
use crate::envconfig::OrchestratorConfig;
use std::path::Path;
use std::sync::Arc;

/// Owns every piece of shared orchestration state: the model registry, the
/// cancellation flags, the event bus and the adapter they all talk to.
///
/// Nothing here is global. Two orchestrators never see each other's models.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: ModelRegistry,
    cancellations: Arc<CancellationFlags>,
    events: Arc<EventBus>,
    runner: Option<InferenceRunner>,
}

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    adapter: Option<Arc<dyn Adapter>>,
    events: Arc<EventBus>,
    log_events: bool,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn handler<H: EventHandler + 'static>(self, handler: H) -> Self {
        self.events.subscribe(handler);
        self
    }

    /// Attach a [`LoggingHandler`] to the event bus (on by default).
    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn build(self) -> Orchestrator {
        if self.log_events {
            self.events.subscribe(LoggingHandler);
        }
        let cancellations = Arc::new(CancellationFlags::new());
        let runner = self
            .adapter
            .map(|adapter| InferenceRunner::new(adapter, Arc::clone(&cancellations), Arc::clone(&self.events)));

        Orchestrator {
            registry: ModelRegistry::with_default_context_size(self.config.default_context_size),
            config: self.config,
            cancellations,
            events: self.events,
            runner,
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: OrchestratorConfig::default(),
            adapter: None,
            events: Arc::new(EventBus::new()),
            log_events: true,
        }
    }

    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::builder().adapter(adapter).build()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn adapter(&self) -> Result<&Arc<dyn Adapter>> {
        self.runner().map(InferenceRunner::adapter)
    }

    fn runner(&self) -> Result<&InferenceRunner> {
        self.runner
            .as_ref()
            .ok_or_else(|| Error::configuration("no inference adapter configured"))
    }

    pub async fn load(&self, path: &str, options: &LoadOptions) -> Result<ModelHandle> {
        let adapter = self.adapter()?;
        match self.registry.load(path, options, adapter.as_ref()).await {
            Ok(model) => {
                self.events.publish(Event::ModelLoaded {
                    model: model.id().to_string(),
                    path: path.to_string(),
                });
                Ok(model)
            }
            Err(e) => {
                self.events.publish(Event::ModelLoadFailed {
                    path: path.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn unload(&self, id: &str) -> bool {
        let Ok(adapter) = self.adapter() else {
            return false;
        };
        let removed = self.registry.unload(id, adapter.as_ref()).await;
        if removed {
            self.events.publish(Event::ModelUnloaded { model: id.to_string() });
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<ModelHandle> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<ModelInfo> {
        self.registry.list()
    }

    pub async fn clear(&self) {
        let count = self.registry.len();
        if let Ok(adapter) = self.adapter() {
            self.registry.clear(adapter.as_ref()).await;
        }
        self.cancellations.clear();
        self.events.publish(Event::RegistryCleared { count });
    }

    pub async fn generate(&self, model: &ModelEntity, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.runner()?.generate(model, prompt, options).await
    }

    /// Like [`Orchestrator::generate`], resolving the model through the registry.
    pub async fn generate_by_id(&self, id: &str, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let model = self.get(id).ok_or_else(|| Error::not_ready(id))?;
        self.generate(&model, prompt, options).await
    }

    pub async fn stream_generate<F>(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        on_text: F,
    ) -> Result<()>
    where
        F: FnMut(&str, bool) + Send,
    {
        self.runner()?.stream_generate(model, prompt, options, on_text).await
    }

    /// A stream sized from the configuration, for use with [`Orchestrator::stream_to`].
    pub fn token_stream(&self) -> TokenStream<String> {
        TokenStream::with_buffer_size(self.config.stream_buffer_size)
    }

    pub async fn stream_to(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        stream: &TokenStream<String>,
    ) -> Result<()> {
        self.runner()?.stream_to(model, prompt, options, stream).await
    }

    /// Flags every in-flight generation on `model` as cancelled.
    pub fn cancel<M: AsModelId + ?Sized>(&self, model: &M) -> bool {
        match &self.runner {
            Some(runner) => runner.cancel(model),
            None => self.cancellations.cancel(model),
        }
    }

    /// Scans `directory` (or the configured models directory) through the
    /// adapter's discovery capability.
    pub async fn discover_models(&self, directory: Option<&Path>) -> Result<Vec<ModelDescriptor>> {
        let adapter = self.adapter()?;
        let discovery = adapter
            .discovery()
            .ok_or(Error::Unsupported { capability: "model discovery" })?;
        let directory = directory.unwrap_or(self.config.models_dir.as_path());

        discovery
            .discover_models(directory)
            .await
            .map_err(|e| Error::Discovery {
                directory: directory.display().to_string(),
                message: format!("{e:#}"),
            })
    }
}
