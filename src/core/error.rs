//! Error types for model orchestration.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry and the generation runner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required collaborator or option was not supplied.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is missing or malformed.
        message: String,
    },

    /// The adapter failed to initialize a model.
    #[error("Failed to load model {model_id} from {path}: {message}")]
    ModelLoad {
        /// Identifier the model would have been registered under.
        model_id: String,
        /// Origin the load was attempted from.
        path: String,
        /// Adapter failure reason.
        message: String,
    },

    /// An operation was attempted on a model without a live session.
    #[error("Model not ready: {model_id}")]
    ModelNotReady {
        /// The offending model identifier.
        model_id: String,
    },

    /// The adapter failed mid-inference for a reason other than cancellation.
    #[error("Generation failed for model {model_id}: {message}")]
    Generation {
        /// Model the generation ran against.
        model_id: String,
        /// Adapter failure reason.
        message: String,
    },

    /// The adapter's model discovery failed.
    #[error("Model discovery failed in {directory}: {message}")]
    Discovery {
        /// Directory that was scanned.
        directory: String,
        /// Adapter failure reason.
        message: String,
    },

    /// An optional adapter capability was requested but is not provided.
    #[error("Adapter does not support {capability}")]
    Unsupported {
        /// Name of the missing capability.
        capability: &'static str,
    },
}

impl Error {
    /// Creates a configuration error with the given message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wraps an adapter load failure.
    pub fn model_load(model_id: impl Into<String>, path: impl Into<String>, source: &anyhow::Error) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            path: path.into(),
            message: format!("{source:#}"),
        }
    }

    /// Creates a not-ready error for the given model.
    pub fn not_ready(model_id: impl Into<String>) -> Self {
        Self::ModelNotReady {
            model_id: model_id.into(),
        }
    }

    /// Wraps an adapter inference failure.
    pub fn generation(model_id: impl Into<String>, source: &anyhow::Error) -> Self {
        Self::Generation {
            model_id: model_id.into(),
            message: format!("{source:#}"),
        }
    }

    /// Returns `true` for errors caused by caller setup rather than the engine.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::ModelNotReady { .. } | Self::Unsupported { .. }
        )
    }
}
