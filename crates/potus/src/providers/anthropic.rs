//! Anthropic Messages API adapter (SSE streaming).

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::providers::stream::{pump_response, StreamParser};
use crate::providers::{ChatStream, Provider, ProviderFuture, CHAT_EVENT_BUFFER};
use crate::{
    ChatEvent, ChatRequest, ContentBlock, MessageRole, Model, ModelPricing, ToolUse, Usage,
};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err("API key is required".to_string());
        }

        Ok(Self {
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Override the endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "max_tokens": req.max_tokens,
            "stream": true,
        });

        if req.temperature > 0.0 {
            body["temperature"] = json!(req.temperature);
        }
        if !req.system.is_empty() {
            body["system"] = json!(req.system);
        }

        let mut messages = Vec::new();
        for msg in &req.messages {
            // The system prompt travels in its own top-level field.
            if msg.role == MessageRole::System {
                continue;
            }

            let content = match msg.content.as_slice() {
                [ContentBlock::Text { text }] => json!(text),
                blocks => convert_content(blocks),
            };

            messages.push(json!({
                "role": msg.role.to_string(),
                "content": content,
            }));
        }
        body["messages"] = Value::Array(messages);

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

fn convert_content(blocks: &[ContentBlock]) -> Value {
    let mut out = Vec::with_capacity(blocks.len());

    for block in blocks {
        match block {
            ContentBlock::Text { text } => out.push(json!({
                "type": "text",
                "text": text,
            })),
            ContentBlock::Image { source } => out.push(json!({
                "type": "image",
                "source": {
                    "type": source.encoding,
                    "media_type": source.media_type,
                    "data": source.data,
                },
            })),
            ContentBlock::ToolUse(tu) => out.push(json!({
                "type": "tool_use",
                "id": tu.id,
                "name": tu.name,
                "input": tu.input,
            })),
            ContentBlock::ToolResult(tr) => out.push(json!({
                "type": "tool_result",
                "tool_use_id": tr.tool_use_id,
                "content": tr.content,
                "is_error": tr.is_error,
            })),
        }
    }

    Value::Array(out)
}

impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
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
                "anthropic request: model={}, messages={}",
                req.model,
                req.messages.len()
            );

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .header("X-API-Key", &self.api_key)
                .header("Anthropic-Version", API_VERSION)
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
            tokio::spawn(pump_response(resp, SseParser::default(), tx));
            Ok(rx)
        })
    }

    fn list_models(&self) -> ProviderFuture<'_, Vec<Model>> {
        Box::pin(async move {
            Ok(vec![
                model("claude-opus-4-5-20251101", "Claude Opus 4.5", 15.00, 75.00),
                model(
                    "claude-sonnet-4-5-20250929",
                    "Claude Sonnet 4.5",
                    3.00,
                    15.00,
                ),
                model("claude-sonnet-4-20250514", "Claude Sonnet 4", 3.00, 15.00),
                model("claude-haiku-4-5-20251015", "Claude Haiku 4.5", 1.00, 5.00),
            ])
        })
    }
}

fn model(id: &str, name: &str, input: f64, output: f64) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        provider: "anthropic".to_string(),
        context_size: 200_000,
        pricing: ModelPricing {
            input_per_1m: input,
            output_per_1m: output,
        },
    }
}

// ── SSE parsing ────────────────────────────────────────────────────

/// State machine over Anthropic SSE `data:` payloads.
#[derive(Default)]
struct SseParser {
    input_tokens: u64,
    output_tokens: u64,
    terminal_emitted: bool,
}

impl SseParser {
    fn usage(&self) -> Option<Usage> {
        if self.input_tokens > 0 || self.output_tokens > 0 {
            Some(Usage {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
                total_tokens: self.input_tokens + self.output_tokens,
            })
        } else {
            None
        }
    }
}

impl StreamParser for SseParser {
    fn parse_line(&mut self, line: &str, out: &mut Vec<ChatEvent>) -> bool {
        let Some(data) = line.strip_prefix("data: ") else {
            // `event:` lines and comments carry no payload.
            return false;
        };
        if data == "[DONE]" {
            return true;
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                out.push(ChatEvent::Error(format!("failed to parse event: {e}")));
                self.terminal_emitted = true;
                return true;
            }
        };

        match event["type"].as_str().unwrap_or_default() {
            "message_start" => {
                if let Some(n) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = n;
                }
                out.push(ChatEvent::MessageStart);
            }

            "content_block_delta" => {
                if event["delta"]["type"] == "text_delta" {
                    if let Some(text) = event["delta"]["text"].as_str() {
                        out.push(ChatEvent::TextDelta(text.to_string()));
                    }
                }
            }

            "content_block_stop" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    out.push(ChatEvent::ToolUse(ToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        input: block
                            .get("input")
                            .cloned()
                            .unwrap_or_else(|| json!({})),
                    }));
                }
            }

            "message_delta" => {
                if let Some(n) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = n;
                }
            }

            "message_stop" => {
                out.push(ChatEvent::MessageDone(self.usage()));
                self.terminal_emitted = true;
                return true;
            }

            // message_start siblings like ping / content_block_start carry
            // nothing we consume.
            _ => {}
        }

        false
    }

    fn finish(&mut self, out: &mut Vec<ChatEvent>) {
        // Normalize a truncated stream: the consumer is still owed a
        // terminal event if neither message_stop nor an error produced one.
        if !self.terminal_emitted {
            out.push(ChatEvent::MessageDone(self.usage()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stream::parse_lines;
    use crate::{Message, ToolResult, ToolSchema};

    #[test]
    fn stream_normalization_text_completion() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"event: message_start"#,
                r#"data: {"type":"message_start","message":{"usage":{"input_tokens":12}}}"#,
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hello"}}"#,
                r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":" world"}}"#,
                r#"data: {"type":"message_delta","usage":{"output_tokens":5}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );

        assert_eq!(events[0], ChatEvent::MessageStart);
        assert_eq!(events[1], ChatEvent::TextDelta("Hello".into()));
        assert_eq!(events[2], ChatEvent::TextDelta(" world".into()));
        assert_eq!(
            events[3],
            ChatEvent::MessageDone(Some(Usage {
                input_tokens: 12,
                output_tokens: 5,
                total_tokens: 17,
            }))
        );
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn tool_use_emitted_at_content_block_stop() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"type":"message_start","message":{}}"#,
                r#"data: {"type":"content_block_stop","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"file_read","input":{"path":"foo"}}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );

        assert_eq!(
            events[1],
            ChatEvent::ToolUse(ToolUse {
                id: "toolu_1".into(),
                name: "file_read".into(),
                input: json!({"path": "foo"}),
            })
        );
        assert!(matches!(events[2], ChatEvent::MessageDone(None)));
    }

    #[test]
    fn malformed_chunk_becomes_error() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"type":"message_start"}"#,
                r#"data: {not json"#,
            ],
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ChatEvent::Error(_)));
    }

    #[test]
    fn request_body_shape() {
        let client = AnthropicClient::new("key").unwrap();
        let req = ChatRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: "be helpful".into(),
            max_tokens: 4096,
            temperature: 0.7,
            messages: vec![Message::user("hi")],
            tools: vec![ToolSchema {
                name: "bash".into(),
                description: "run a command".into(),
                input_schema: json!({"type": "object"}),
            }],
        };

        let body = client.build_request(&req);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "be helpful");
        assert_eq!(body["temperature"], 0.7);
        // Single text block collapses to a plain string.
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["tools"][0]["name"], "bash");
        assert!(body["tools"][0].get("input_schema").is_some());
    }

    #[test]
    fn system_role_messages_never_hit_the_wire() {
        let client = AnthropicClient::new("key").unwrap();
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![
                Message {
                    role: MessageRole::System,
                    content: vec![ContentBlock::text("sneaky system")],
                },
                Message::user("hi"),
            ],
            ..Default::default()
        };

        let body = client.build_request(&req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn tool_result_message_converts_to_blocks() {
        let client = AnthropicClient::new("key").unwrap();
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![Message::tool_results(vec![ToolResult {
                tool_use_id: "toolu_1".into(),
                content: "BODY".into(),
                is_error: false,
            }])],
            ..Default::default()
        };

        let body = client.build_request(&req);
        let content = &body["messages"][0]["content"][0];
        assert_eq!(content["type"], "tool_result");
        assert_eq!(content["tool_use_id"], "toolu_1");
        assert_eq!(content["content"], "BODY");
        assert_eq!(content["is_error"], false);
    }

    #[test]
    fn empty_api_key_rejected() {
        assert!(AnthropicClient::new("").is_err());
    }
}
