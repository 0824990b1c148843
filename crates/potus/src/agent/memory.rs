//! Conversation memory: an append-only message log with a parallel
//! per-message token index.
//!
//! The agent loop is the only writer, but readers (UI snapshots, budget
//! checks) run concurrently, so the state lives behind a `RwLock` and
//! accessors hand out owned copies.

use std::sync::{Arc, RwLock};

use crate::context::estimator::{SimpleEstimator, TokenEstimator, TokenInfo};
use crate::Message;

/// Aggregate token numbers for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenSummary {
    pub total_tokens: usize,
    pub system_tokens: usize,
    pub message_tokens: usize,
    pub message_count: usize,
    pub prunable_tokens: usize,
}

/// The session's conversation log.
pub struct Memory {
    estimator: Arc<dyn TokenEstimator>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    token_info: Vec<TokenInfo>,
    total_tokens: usize,
    system_tokens: usize,
}

impl Memory {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn with_default_estimator() -> Self {
        Self::new(Arc::new(SimpleEstimator::new()))
    }

    /// Append a user text message. Returns the tokens it added.
    pub fn add_user(&self, text: impl Into<String>) -> usize {
        self.add(Message::user(text))
    }

    /// Append a message. Returns the tokens it added.
    pub fn add(&self, msg: Message) -> usize {
        let mut inner = self.inner.write().expect("memory lock poisoned");
        let index = inner.messages.len();
        let info = TokenInfo::for_message(index, &msg, self.estimator.as_ref());
        let tokens = info.tokens;

        inner.messages.push(msg);
        inner.token_info.push(info);
        inner.total_tokens += tokens;
        tokens
    }

    /// Replace the whole conversation (context rewrites only). The token
    /// index is recomputed from scratch.
    pub fn replace(&self, messages: Vec<Message>) {
        let mut inner = self.inner.write().expect("memory lock poisoned");
        inner.token_info = messages
            .iter()
            .enumerate()
            .map(|(i, m)| TokenInfo::for_message(i, m, self.estimator.as_ref()))
            .collect();
        inner.total_tokens = inner.token_info.iter().map(|i| i.tokens).sum();
        inner.messages = messages;
    }

    /// Owned copy of the conversation.
    pub fn get_messages(&self) -> Vec<Message> {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .messages
            .clone()
    }

    /// Owned copy of the token index.
    pub fn get_token_info(&self) -> Vec<TokenInfo> {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .token_info
            .clone()
    }

    /// Message tokens plus the system-prompt cost.
    pub fn total(&self) -> usize {
        let inner = self.inner.read().expect("memory lock poisoned");
        inner.total_tokens + inner.system_tokens
    }

    pub fn message_tokens(&self) -> usize {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .total_tokens
    }

    /// Store the externally-computed system prompt cost.
    pub fn set_system_tokens(&self, tokens: usize) {
        self.inner
            .write()
            .expect("memory lock poisoned")
            .system_tokens = tokens;
    }

    pub fn system_tokens(&self) -> usize {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .system_tokens
    }

    pub fn count(&self) -> usize {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .messages
            .len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("memory lock poisoned");
        inner.messages.clear();
        inner.token_info.clear();
        inner.total_tokens = 0;
    }

    pub fn last_message(&self) -> Option<Message> {
        self.inner
            .read()
            .expect("memory lock poisoned")
            .messages
            .last()
            .cloned()
    }

    pub fn token_summary(&self) -> TokenSummary {
        let inner = self.inner.read().expect("memory lock poisoned");
        let prunable_tokens = inner
            .token_info
            .iter()
            .filter(|i| i.is_prunable)
            .map(|i| i.tokens)
            .sum();

        TokenSummary {
            total_tokens: inner.total_tokens + inner.system_tokens,
            system_tokens: inner.system_tokens,
            message_tokens: inner.total_tokens,
            message_count: inner.messages.len(),
            prunable_tokens,
        }
    }
}
