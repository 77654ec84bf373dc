use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MAX_TOKENS: i64 = 100;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_TOP_K: i32 = 40;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.1;

/// Sampling parameters for one generation call.
///
/// Values are taken as given: a negative `max_tokens` or a `temperature`
/// above 2 is passed through to the adapter untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    pub max_tokens: i64,
    pub temperature: f32,
    pub top_p: f32,
    /// 0 disables top-k filtering.
    pub top_k: i32,
    pub repetition_penalty: f32,
    pub seed: Option<i64>,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
            seed: None,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a loosely typed map, falling back to defaults for
    /// missing or mistyped entries. Both `max_tokens` and `maxTokens` spellings
    /// are accepted.
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Self {
        let mut opts = Self::default();
        let get = |snake: &str, camel: &str| map.get(snake).or_else(|| map.get(camel));

        if let Some(v) = get("max_tokens", "maxTokens").and_then(|v| v.as_i64()) {
            opts.max_tokens = v;
        }
        if let Some(v) = get("temperature", "temperature").and_then(|v| v.as_f64()) {
            opts.temperature = v as f32;
        }
        if let Some(v) = get("top_p", "topP").and_then(|v| v.as_f64()) {
            opts.top_p = v as f32;
        }
        if let Some(v) = get("top_k", "topK").and_then(|v| v.as_i64()) {
            opts.top_k = v as i32;
        }
        if let Some(v) = get("repetition_penalty", "repetitionPenalty").and_then(|v| v.as_f64()) {
            opts.repetition_penalty = v as f32;
        }
        if let Some(v) = get("seed", "seed").and_then(|v| v.as_i64()) {
            opts.seed = Some(v);
        }
        if let Some(v) = get("stop_sequences", "stopSequences").and_then(|v| v.as_array()) {
            opts.stop_sequences = v
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect();
        }

        opts
    }

    pub fn max_tokens(mut self, max: i64) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = p;
        self
    }

    pub fn top_k(mut self, k: i32) -> Self {
        self.top_k = k;
        self
    }

    pub fn repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = penalty;
        self
    }

    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    /// Copy of these options with the token limit replaced.
    pub fn with_max_tokens(&self, max: i64) -> Self {
        Self {
            max_tokens: max,
            ..self.clone()
        }
    }

    pub fn top_k_enabled(&self) -> bool {
        self.top_k > 0
    }
}
