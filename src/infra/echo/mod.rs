//! In-process reference adapter.
//!
//! Tokens are raw UTF-8 bytes and "generation" replays the context window
//! from its start. It lets the CLI and the tests drive the orchestrator end
//! to end without a native engine.

use crate::core::adapter::{
    Adapter, AdapterResult, LoadParams, LoadedModel, ModelDescriptor, ModelDiscovery, ModelSession, TokenSink,
};
use crate::core::{CancelProbe, GenerationOptions, ModelContext, ModelEntity, TokenId};
use anyhow::Context as _;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub const MODEL_EXTENSIONS: &[&str] = &["gguf", "ggml", "bin", "safetensors"];

#[derive(Debug)]
struct EchoSession {
    params: LoadParams,
}

#[derive(Debug, Clone, Default)]
pub struct EchoAdapter {
    token_delay: Option<Duration>,
}

impl EchoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps between generated tokens, which makes cancellation observable.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    fn session(&self, model: &ModelEntity) -> AdapterResult<ModelSession> {
        let session = model
            .session()
            .with_context(|| format!("model {} has no session", model.id()))?;
        if session.downcast_ref::<EchoSession>().is_none() {
            anyhow::bail!("model {} was not loaded by the echo adapter", model.id());
        }
        Ok(session)
    }

    async fn generate_into<F>(
        &self,
        context: &ModelContext,
        options: &GenerationOptions,
        probe: &CancelProbe,
        mut emit: F,
    ) -> AdapterResult<()>
    where
        F: FnMut(TokenId) + Send,
    {
        let limit = usize::try_from(options.max_tokens).unwrap_or(0);
        for token in context.tokens().iter().copied().take(limit) {
            if probe.is_cancelled() {
                anyhow::bail!("generation cancelled");
            }
            if let Some(delay) = self.token_delay {
                tokio::time::sleep(delay).await;
            }
            emit(token);
        }
        Ok(())
    }
}

fn decode(tokens: &[TokenId]) -> AdapterResult<String> {
    let bytes = tokens
        .iter()
        .map(|t| u8::try_from(t.0).map_err(|_| anyhow::anyhow!("token {} is outside the byte vocabulary", t.0)))
        .collect::<AdapterResult<Vec<u8>>>()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl Adapter for EchoAdapter {
    fn name(&self) -> &str {
        "echo"
    }

    async fn initialize_model(&self, path: &str, params: &LoadParams) -> AdapterResult<LoadedModel> {
        tracing::debug!(path, context_size = params.context_size, "echo session created");
        Ok(LoadedModel::new(ModelSession::new(EchoSession {
            params: params.clone(),
        })))
    }

    async fn tokenize(&self, model: &ModelEntity, text: &str) -> AdapterResult<Vec<TokenId>> {
        self.session(model)?;
        Ok(text.bytes().map(|b| TokenId(i32::from(b))).collect())
    }

    async fn detokenize(&self, model: &ModelEntity, tokens: &[TokenId]) -> AdapterResult<String> {
        self.session(model)?;
        decode(tokens)
    }

    async fn detokenize_token(&self, model: &ModelEntity, token: TokenId) -> AdapterResult<String> {
        self.session(model)?;
        decode(&[token])
    }

    async fn run_inference(
        &self,
        model: &ModelEntity,
        context: &ModelContext,
        options: &GenerationOptions,
        probe: &CancelProbe,
    ) -> AdapterResult<Vec<TokenId>> {
        let session = self.session(model)?;
        if let Some(echo) = session.downcast_ref::<EchoSession>() {
            tracing::trace!(
                context_size = echo.params.context_size,
                prompt_tokens = context.context_length(),
                "echo inference"
            );
        }
        let mut output = Vec::new();
        self.generate_into(context, options, probe, |token| output.push(token))
            .await?;
        Ok(output)
    }

    async fn run_inference_streaming(
        &self,
        model: &ModelEntity,
        context: &ModelContext,
        options: &GenerationOptions,
        sink: TokenSink,
        probe: &CancelProbe,
    ) -> AdapterResult<()> {
        self.session(model)?;
        self.generate_into(context, options, probe, |token| {
            sink.emit(token);
        })
        .await
    }

    async fn free_model(&self, model: &ModelEntity) -> AdapterResult<()> {
        tracing::debug!(model_id = %model.id(), "echo session released");
        Ok(())
    }

    fn discovery(&self) -> Option<&dyn ModelDiscovery> {
        Some(self)
    }
}

#[async_trait]
impl ModelDiscovery for EchoAdapter {
    async fn discover_models(&self, directory: &Path) -> AdapterResult<Vec<ModelDescriptor>> {
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .with_context(|| format!("cannot read {}", directory.display()))?;

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let format = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase)
                .filter(|ext| MODEL_EXTENSIONS.contains(&ext.as_str()));
            let Some(format) = format else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            found.push(ModelDescriptor {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                size_bytes: metadata.len(),
                format: Some(format),
            });
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}
