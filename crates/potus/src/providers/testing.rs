//! Scripted provider for tests.
//!
//! [`MockProvider`] plays back a fixed sequence of event scripts, one per
//! `chat()` call, and records every request it receives so tests can
//! assert on what the agent actually sent.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::providers::{ChatStream, Provider, ProviderFuture, CHAT_EVENT_BUFFER};
use crate::{ChatEvent, ChatRequest, Model};

/// A provider that replays pre-scripted event streams.
pub struct MockProvider {
    scripts: Mutex<std::collections::VecDeque<Vec<ChatEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    /// One inner `Vec<ChatEvent>` per expected `chat()` call, consumed in
    /// order. A call beyond the script fails.
    pub fn new(scripts: Vec<Vec<ChatEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests captured so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        false
    }

    fn chat(&self, req: ChatRequest) -> ProviderFuture<'_, ChatStream> {
        Box::pin(async move {
            self.requests.lock().expect("mock lock poisoned").push(req);

            let script = self
                .scripts
                .lock()
                .expect("mock lock poisoned")
                .pop_front()
                .ok_or_else(|| "mock provider: no scripted response left".to_string())?;

            let (tx, rx) = mpsc::channel(CHAT_EVENT_BUFFER);
            tokio::spawn(async move {
                for event in script {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        })
    }

    fn list_models(&self) -> ProviderFuture<'_, Vec<Model>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}
