use crate::core::TokenId;

pub const DEFAULT_CONTEXT_SIZE: usize = 2048;

/// Token window fed to the engine for a single generation.
///
/// `tokens` never grows past `context_size`; overflow is dropped from the
/// front so the most recent tokens survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelContext {
    tokens: Vec<TokenId>,
    context_size: usize,
    output_tokens: Vec<TokenId>,
}

impl ModelContext {
    pub fn new(tokens: Vec<TokenId>, context_size: usize) -> Self {
        let mut ctx = Self {
            tokens,
            context_size,
            output_tokens: Vec::new(),
        };
        ctx.enforce_limit();
        ctx
    }

    pub fn empty(context_size: usize) -> Self {
        Self::new(Vec::new(), context_size)
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn output_tokens(&self) -> &[TokenId] {
        &self.output_tokens
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn context_length(&self) -> usize {
        self.tokens.len()
    }

    /// Free slots left in the window. Signed so budget arithmetic can go negative.
    pub fn remaining_space(&self) -> i64 {
        self.context_size as i64 - self.tokens.len() as i64
    }

    pub fn is_full(&self) -> bool {
        self.tokens.len() >= self.context_size
    }

    pub fn append(&mut self, tokens: &[TokenId]) {
        self.tokens.extend_from_slice(tokens);
        self.enforce_limit();
    }

    pub fn push(&mut self, token: TokenId) {
        self.append(&[token]);
    }

    /// Records a generated token. It also enters the window so subsequent
    /// steps see it as context.
    pub fn push_output(&mut self, token: TokenId) {
        self.output_tokens.push(token);
        self.push(token);
    }

    /// Keeps only the last `len` tokens of the window.
    pub fn keep_last(&mut self, len: usize) {
        if self.tokens.len() > len {
            let start = self.tokens.len() - len;
            self.tokens.drain(..start);
        }
    }

    pub fn into_output(self) -> Vec<TokenId> {
        self.output_tokens
    }

    fn enforce_limit(&mut self) {
        self.keep_last(self.context_size);
    }
}
