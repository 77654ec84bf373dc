//! Prompt-to-text generation against a loaded model.
//!
//! The runner builds the token window, applies the token budget, drives the
//! adapter, and turns failures that race with a cancellation into empty
//! results.

use crate::app::events::{Event, EventBus};
use crate::core::cancel::{AsModelId, CancelProbe, CancellationFlags};
use crate::core::context::{ModelContext, DEFAULT_CONTEXT_SIZE};
use crate::core::error::{Error, Result};
use crate::core::stream::TokenStream;
use crate::core::{Adapter, GenerationOptions, ModelEntity, TokenSink};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Tokens kept free for generation when a prompt fills the whole window.
pub const PROMPT_HEADROOM: usize = 100;
/// Slack subtracted from the remaining window before capping `max_tokens`.
pub const BUDGET_SAFETY_MARGIN: i64 = 10;

/// Front-truncates a prompt that reaches the window size so that
/// [`PROMPT_HEADROOM`] tokens stay free.
pub fn fit_prompt(context: &mut ModelContext) {
    if context.context_length() >= context.context_size() {
        let keep = context.context_size().saturating_sub(PROMPT_HEADROOM);
        context.keep_last(keep);
    }
}

/// Number of new tokens to request. May be zero or negative when the window
/// is nearly full; the adapter is still called in that case.
pub fn token_budget(context: &ModelContext, max_tokens: i64) -> i64 {
    max_tokens.min(context.remaining_space() - BUDGET_SAFETY_MARGIN)
}

pub struct InferenceRunner {
    adapter: Arc<dyn Adapter>,
    cancellations: Arc<CancellationFlags>,
    events: Arc<EventBus>,
}

struct Generated<T> {
    value: T,
    tokens: usize,
}

impl InferenceRunner {
    pub fn new(adapter: Arc<dyn Adapter>, cancellations: Arc<CancellationFlags>, events: Arc<EventBus>) -> Self {
        Self {
            adapter,
            cancellations,
            events,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Runs a complete generation and returns the decoded text.
    ///
    /// Resolves to an empty string instead of an error when the model was
    /// cancelled while the adapter failed.
    pub async fn generate(&self, model: &ModelEntity, prompt: &str, options: &GenerationOptions) -> Result<String> {
        ensure_ready(model)?;
        let probe = self.cancellations.reset(model.id());
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("generate", model_id = %model.id(), %request_id);

        async {
            self.publish_started(model, &request_id, false);
            let outcome = self.run_batch(model, prompt, options, &probe).await;
            model.touch();
            self.settle(model, &request_id, &probe, outcome)
                .map(|generated| generated.map(|g| g.value).unwrap_or_default())
        }
        .instrument(span)
        .await
    }

    /// Runs a generation, calling `on_text(piece, false)` per token as it
    /// arrives and `on_text("", true)` exactly once when the adapter is done,
    /// whatever the outcome.
    pub async fn stream_generate<F>(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        mut on_text: F,
    ) -> Result<()>
    where
        F: FnMut(&str, bool) + Send,
    {
        ensure_ready(model)?;
        let probe = self.cancellations.reset(model.id());
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("stream_generate", model_id = %model.id(), %request_id);

        async {
            self.publish_started(model, &request_id, true);
            let outcome = self.run_streaming(model, prompt, options, &probe, &mut on_text).await;
            on_text("", true);
            model.touch();
            self.settle(model, &request_id, &probe, outcome).map(|_| ())
        }
        .instrument(span)
        .await
    }

    /// Streams decoded pieces into `stream` and ends it when generation stops.
    pub async fn stream_to(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        stream: &TokenStream<String>,
    ) -> Result<()> {
        let sink = stream.clone();
        self.stream_generate(model, prompt, options, move |text, done| {
            if done {
                sink.end();
            } else {
                sink.write(text.to_string());
            }
        })
        .await
    }

    pub fn cancel<M: AsModelId + ?Sized>(&self, model: &M) -> bool {
        let cancelled = self.cancellations.cancel(model);
        if cancelled {
            tracing::info!(model_id = %model.model_id(), "cancellation requested");
            self.events.publish(Event::CancelRequested {
                model: model.model_id().to_string(),
            });
        }
        cancelled
    }

    pub fn is_cancelled(&self, model_id: &str) -> bool {
        self.cancellations.is_cancelled(model_id)
    }

    async fn build_context(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
    ) -> anyhow::Result<(ModelContext, GenerationOptions)> {
        let tokens = self.adapter.tokenize(model, prompt).await?;
        let prompt_len = tokens.len();
        let context_size = model.metadata().context_size.unwrap_or(DEFAULT_CONTEXT_SIZE);

        let mut context = ModelContext::new(tokens, context_size);
        fit_prompt(&mut context);
        if context.context_length() < prompt_len {
            tracing::debug!(prompt_len, kept = context.context_length(), context_size, "prompt truncated");
        }

        let max_new_tokens = token_budget(&context, options.max_tokens);
        tracing::debug!(
            requested = options.max_tokens,
            max_new_tokens,
            remaining = context.remaining_space(),
            "token budget"
        );
        Ok((context, options.with_max_tokens(max_new_tokens)))
    }

    async fn run_batch(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        probe: &CancelProbe,
    ) -> anyhow::Result<Generated<String>> {
        let (mut context, options) = self.build_context(model, prompt, options).await?;

        let output = self.adapter.run_inference(model, &context, &options, probe).await?;
        for token in output {
            context.push_output(token);
        }

        let text = self.adapter.detokenize(model, context.output_tokens()).await?;
        Ok(Generated {
            value: text,
            tokens: context.output_tokens().len(),
        })
    }

    async fn run_streaming<F>(
        &self,
        model: &ModelEntity,
        prompt: &str,
        options: &GenerationOptions,
        probe: &CancelProbe,
        on_text: &mut F,
    ) -> anyhow::Result<Generated<()>>
    where
        F: FnMut(&str, bool) + Send,
    {
        let (context, options) = self.build_context(model, prompt, options).await?;
        let (sink, mut tokens) = TokenSink::channel();
        let adapter = &self.adapter;

        let produce = adapter.run_inference_streaming(model, &context, &options, sink, probe);
        let consume = async {
            let mut count = 0usize;
            while let Some(token) = tokens.recv().await {
                count += 1;
                match adapter.detokenize_token(model, token).await {
                    Ok(text) => on_text(&text, false),
                    Err(e) => tracing::warn!(token = token.0, error = %format!("{e:#}"), "skipping undecodable token"),
                }
            }
            count
        };

        let (produced, count) = tokio::join!(produce, consume);
        produced.map(|()| Generated { value: (), tokens: count })
    }

    fn settle<T>(
        &self,
        model: &ModelEntity,
        request_id: &str,
        probe: &CancelProbe,
        outcome: anyhow::Result<Generated<T>>,
    ) -> Result<Option<Generated<T>>> {
        match outcome {
            Ok(generated) => {
                let event = if probe.is_cancelled() {
                    Event::InferenceCancelled {
                        model: model.id().to_string(),
                        request_id: request_id.to_string(),
                    }
                } else {
                    Event::InferenceComplete {
                        model: model.id().to_string(),
                        request_id: request_id.to_string(),
                        total_tokens: generated.tokens,
                    }
                };
                tracing::debug!(tokens = generated.tokens, "generation finished");
                self.events.publish(event);
                Ok(Some(generated))
            }
            Err(e) if probe.is_cancelled() => {
                tracing::info!(error = %format!("{e:#}"), "generation cancelled");
                self.events.publish(Event::InferenceCancelled {
                    model: model.id().to_string(),
                    request_id: request_id.to_string(),
                });
                Ok(None)
            }
            Err(e) => {
                let err = Error::generation(model.id(), &e);
                tracing::warn!(error = %err, "generation failed");
                self.events.publish(Event::InferenceError {
                    model: model.id().to_string(),
                    request_id: request_id.to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn publish_started(&self, model: &ModelEntity, request_id: &str, streaming: bool) {
        self.events.publish(Event::InferenceStarted {
            model: model.id().to_string(),
            request_id: request_id.to_string(),
            streaming,
        });
    }
}

fn ensure_ready(model: &ModelEntity) -> Result<()> {
    if model.is_loaded() {
        Ok(())
    } else {
        Err(Error::not_ready(model.id()))
    }
}
