use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ModelLoaded { model: String, path: String },
    ModelLoadFailed { path: String, error: String },
    ModelUnloaded { model: String },
    RegistryCleared { count: usize },
    InferenceStarted { model: String, request_id: String, streaming: bool },
    InferenceComplete { model: String, request_id: String, total_tokens: usize },
    InferenceCancelled { model: String, request_id: String },
    InferenceError { model: String, request_id: String, error: String },
    CancelRequested { model: String },
}

impl Event {
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ModelLoaded { .. } => "model_loaded",
            Event::ModelLoadFailed { .. } => "model_load_failed",
            Event::ModelUnloaded { .. } => "model_unloaded",
            Event::RegistryCleared { .. } => "registry_cleared",
            Event::InferenceStarted { .. } => "inference_started",
            Event::InferenceComplete { .. } => "inference_complete",
            Event::InferenceCancelled { .. } => "inference_cancelled",
            Event::InferenceError { .. } => "inference_error",
            Event::CancelRequested { .. } => "cancel_requested",
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
    fn name(&self) -> &str;
}

pub type HandlerId = usize;

#[allow(clippy::type_complexity)]
pub struct EventBus {
    handlers: RwLock<HashMap<HandlerId, (String, Arc<dyn EventHandler>)>>,
    callbacks: RwLock<HashMap<String, Vec<EventCallback>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn subscribe<H: EventHandler + 'static>(&self, handler: H) -> HandlerId {
        let handler_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = handler.name().to_string();
        self.handlers.write().insert(handler_id, (name, Arc::new(handler)));
        handler_id
    }

    /// Registers a callback for one event type, e.g. `"inference_complete"`.
    pub fn subscribe_to<F>(&self, event_type: &str, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn unsubscribe(&self, handler_id: HandlerId) -> bool {
        self.handlers.write().remove(&handler_id).is_some()
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.read().values().map(|(name, _)| name.clone()).collect()
    }

    pub fn publish(&self, event: Event) {
        // Handlers and callbacks run outside the locks so they may publish or subscribe themselves.
        let handlers: Vec<Arc<dyn EventHandler>> =
            self.handlers.read().values().map(|(_, h)| Arc::clone(h)).collect();
        for handler in handlers {
            handler.handle(&event);
        }

        let callbacks: Vec<EventCallback> = self
            .callbacks
            .read()
            .get(event.type_name())
            .map(|callbacks| callbacks.to_vec())
            .unwrap_or_default();
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
        self.callbacks.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &Event) {
        match event {
            Event::InferenceError { .. } | Event::ModelLoadFailed { .. } => {
                tracing::warn!(kind = event.type_name(), ?event, "orchestrator event")
            }
            _ => tracing::debug!(kind = event.type_name(), ?event, "orchestrator event"),
        }
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Keeps every event it sees; handy for assertions and diagnostics dumps.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<RwLock<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events.read().iter().filter(|e| e.type_name() == event_type).count()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: &Event) {
        self.events.write().push(event.clone());
    }

    fn name(&self) -> &str {
        "recording"
    }
}
