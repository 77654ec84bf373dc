//! Advisory per-model cancellation.
//!
//! One flag exists per model id and is shared by every in-flight generation
//! against that id, so cancelling a model stops all of its generations.

use crate::core::model::ModelEntity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything a cancellation request can be addressed to.
pub trait AsModelId {
    fn model_id(&self) -> &str;
}

impl AsModelId for str {
    fn model_id(&self) -> &str {
        self
    }
}

impl AsModelId for String {
    fn model_id(&self) -> &str {
        self
    }
}

impl AsModelId for ModelEntity {
    fn model_id(&self) -> &str {
        self.id()
    }
}

impl<T: AsModelId + ?Sized> AsModelId for Arc<T> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[derive(Debug, Default)]
pub struct CancellationFlags {
    flags: RwLock<HashMap<String, Arc<AtomicBool>>>,
}

impl CancellationFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, model_id: &str) -> Arc<AtomicBool> {
        if let Some(flag) = self.flags.read().get(model_id) {
            return Arc::clone(flag);
        }
        let mut flags = self.flags.write();
        Arc::clone(flags.entry(model_id.to_string()).or_default())
    }

    /// Clears the flag and returns a probe bound to it.
    pub fn reset(&self, model_id: &str) -> CancelProbe {
        let flag = self.flag(model_id);
        flag.store(false, Ordering::SeqCst);
        CancelProbe { flag }
    }

    /// Raises the flag for `model`. Returns `false` when no id can be resolved.
    pub fn cancel<M: AsModelId + ?Sized>(&self, model: &M) -> bool {
        let model_id = model.model_id();
        if model_id.is_empty() {
            return false;
        }
        self.flag(model_id).store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self, model_id: &str) -> bool {
        self.flags
            .read()
            .get(model_id)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Lowers every flag. Each id keeps its flag, so probes already handed
    /// out still observe later calls to [`CancellationFlags::cancel`].
    pub fn clear(&self) {
        for flag in self.flags.read().values() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

/// Read side of a model's cancellation flag, handed to the adapter.
#[derive(Debug, Clone)]
pub struct CancelProbe {
    flag: Arc<AtomicBool>,
}

impl CancelProbe {
    /// A probe that never reports cancellation.
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
