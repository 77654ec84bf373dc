use crate::core::context::DEFAULT_CONTEXT_SIZE;
use crate::core::stream::DEFAULT_BUFFER_SIZE;
use std::env;
use std::path::PathBuf;

pub const ENV_CONTEXT_SIZE: &str = "LLMHOST_CONTEXT_SIZE";
pub const ENV_STREAM_BUFFER: &str = "LLMHOST_STREAM_BUFFER";
pub const ENV_MODELS: &str = "LLMHOST_MODELS";
pub const ENV_LOG: &str = "LLMHOST_LOG";

const DEFAULT_MODELS_DIR: &str = "~/.llmhost/models";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Context size requested from the engine when a load does not name one.
    pub default_context_size: usize,
    pub stream_buffer_size: usize,
    pub models_dir: PathBuf,
    pub log_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_context_size: DEFAULT_CONTEXT_SIZE,
            stream_buffer_size: DEFAULT_BUFFER_SIZE,
            models_dir: expand_home(DEFAULT_MODELS_DIR),
            log_level: "info".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unparseable values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = lookup(ENV_CONTEXT_SIZE).and_then(|v| v.trim().parse().ok()) {
            config.default_context_size = size;
        }

        if let Some(size) = lookup(ENV_STREAM_BUFFER).and_then(|v| v.trim().parse().ok()) {
            config.stream_buffer_size = size;
        }

        if let Some(dir) = lookup(ENV_MODELS).filter(|v| !v.trim().is_empty()) {
            config.models_dir = expand_home(dir.trim());
        }

        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            config.log_level = level.trim().to_lowercase();
        }

        config
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OrchestratorConfig::from_lookup(lookup(&[]));
        assert_eq!(config.default_context_size, 2048);
        assert_eq!(config.stream_buffer_size, 1024);
        assert_eq!(config.log_level, "info");
        assert!(config.models_dir.ends_with(".llmhost/models"));
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (ENV_CONTEXT_SIZE, " 8192 "),
            (ENV_STREAM_BUFFER, "16"),
            (ENV_MODELS, "/srv/models"),
            (ENV_LOG, "DEBUG"),
        ]));
        assert_eq!(config.default_context_size, 8192);
        assert_eq!(config.stream_buffer_size, 16);
        assert_eq!(config.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = OrchestratorConfig::from_lookup(lookup(&[(ENV_CONTEXT_SIZE, "lots"), (ENV_MODELS, "  ")]));
        assert_eq!(config.default_context_size, 2048);
        assert_eq!(config.models_dir, OrchestratorConfig::default().models_dir);
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
