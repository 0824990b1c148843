//! Ollama adapter (NDJSON streaming, endpoint-only, no authentication).
//!
//! Ollama's chat endpoint emits one JSON object per line and, unlike the
//! hosted APIs, never assigns tool-call ids. The adapter synthesizes them
//! from the tool name, suffixing repeats within a single response so
//! result linkage stays unambiguous.

use std::collections::HashMap;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::providers::stream::{pump_response, StreamParser};
use crate::providers::{ChatStream, Provider, ProviderFuture, CHAT_EVENT_BUFFER};
use crate::{
    ChatEvent, ChatRequest, ContentBlock, Model, ModelPricing, ToolUse, Usage,
};

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Client for a local Ollama server.
pub struct OllamaClient {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, String> {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint
        };

        Ok(Self {
            endpoint,
            client: reqwest::Client::new(),
        })
    }

    fn build_request(&self, req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "stream": true,
        });

        if req.temperature > 0.0 {
            body["options"] = json!({ "temperature": req.temperature });
        }

        let mut messages = Vec::new();

        if !req.system.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": req.system,
            }));
        }

        for msg in &req.messages {
            let mut content = String::new();
            let mut images: Vec<String> = Vec::new();
            let mut tool_calls: Vec<Value> = Vec::new();

            for block in &msg.content {
                match block {
                    ContentBlock::Text { text } => content = text.clone(),
                    ContentBlock::Image { source } => images.push(source.data.clone()),
                    ContentBlock::ToolUse(tu) => tool_calls.push(json!({
                        "function": {
                            "name": tu.name,
                            "arguments": tu.input,
                        },
                    })),
                    ContentBlock::ToolResult(tr) => content = tr.content.clone(),
                }
            }

            let mut api_msg = json!({
                "role": msg.role.to_string(),
                "content": content,
            });
            if !images.is_empty() {
                api_msg["images"] = json!(images);
            }
            if !tool_calls.is_empty() {
                api_msg["tool_calls"] = Value::Array(tool_calls);
            }

            messages.push(api_msg);
        }
        body["messages"] = Value::Array(messages);

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

impl Provider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn chat(&self, req: ChatRequest) -> ProviderFuture<'_, ChatStream> {
        Box::pin(async move {
            let body = self.build_request(&req);
            debug!(
                "ollama request: model={}, messages={}",
                req.model,
                req.messages.len()
            );

            let resp = self
                .client
                .post(format!("{}/api/chat", self.endpoint))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| format!("failed to send request: {e}"))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(format!("API error (status {}): {text}", status.as_u16()));
            }

            let (tx, rx) = mpsc::channel(CHAT_EVENT_BUFFER);
            tokio::spawn(async move {
                // NDJSON has no message_start marker; synthesize one.
                if tx.send(ChatEvent::MessageStart).await.is_err() {
                    return;
                }
                pump_response(resp, NdjsonParser::default(), tx).await;
            });
            Ok(rx)
        })
    }

    fn list_models(&self) -> ProviderFuture<'_, Vec<Model>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(format!("{}/api/tags", self.endpoint))
                .send()
                .await
                .map_err(|e| format!("failed to fetch models: {e}"))?;

            let body: Value = resp
                .json()
                .await
                .map_err(|e| format!("failed to decode response: {e}"))?;

            let models = body["models"]
                .as_array()
                .map(|models| {
                    models
                        .iter()
                        .filter_map(|m| m["name"].as_str())
                        .map(|name| Model {
                            id: name.to_string(),
                            name: name.to_string(),
                            provider: "ollama".to_string(),
                            context_size: 4096,
                            pricing: ModelPricing::default(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            Ok(models)
        })
    }
}

// ── NDJSON parsing ─────────────────────────────────────────────────

/// State machine over Ollama NDJSON chunks.
#[derive(Default)]
struct NdjsonParser {
    /// Per-name counters for synthesized tool-call ids.
    id_counts: HashMap<String, usize>,
}

impl NdjsonParser {
    /// Ollama omits call ids; derive one from the tool name, suffixing
    /// repeats so two calls to the same tool stay distinguishable.
    fn synthesize_id(&mut self, name: &str) -> String {
        let count = self.id_counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            format!("tool_{name}")
        } else {
            format!("tool_{name}_{count}")
        }
    }
}

impl StreamParser for NdjsonParser {
    fn parse_line(&mut self, line: &str, out: &mut Vec<ChatEvent>) -> bool {
        let chunk: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                out.push(ChatEvent::Error(format!("failed to parse chunk: {e}")));
                return true;
            }
        };

        if chunk["done"].as_bool() == Some(true) {
            let input = chunk["prompt_eval_count"].as_u64().unwrap_or(0);
            let output = chunk["eval_count"].as_u64().unwrap_or(0);
            let usage = if input > 0 || output > 0 {
                Some(Usage {
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: input + output,
                })
            } else {
                None
            };
            out.push(ChatEvent::MessageDone(usage));
            return true;
        }

        let message = &chunk["message"];
        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                out.push(ChatEvent::TextDelta(content.to_string()));
            }
        }

        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for tc in tool_calls {
                let function = &tc["function"];
                let Some(name) = function["name"].as_str() else {
                    continue;
                };
                let input = function
                    .get("arguments")
                    .filter(|a| a.is_object())
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                let id = self.synthesize_id(name);
                out.push(ChatEvent::ToolUse(ToolUse {
                    id,
                    name: name.to_string(),
                    input,
                }));
            }
        }

        false
    }
}
