//! OpenAI chat completions adapter (SSE streaming).
//!
//! Tool calls arrive as fragments spread across chunks: the first delta
//! for a call carries its id and function name, later deltas append to
//! the JSON arguments string. The parser accumulates per call index and
//! emits complete [`ChatEvent::ToolUse`] events only when the chunk with
//! `finish_reason == "tool_calls"` arrives.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::providers::stream::{pump_response, StreamParser};
use crate::providers::{ChatStream, Provider, ProviderFuture, CHAT_EVENT_BUFFER};
use crate::{
    ChatEvent, ChatRequest, ContentBlock, MessageRole, Model, ModelPricing, ToolUse, Usage,
};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Client for the OpenAI chat completions API.
pub struct OpenAiClient {
    api_key: String,
    organization: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, organization: impl Into<String>) -> Result<Self, String> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err("API key is required".to_string());
        }

        Ok(Self {
            api_key,
            organization: organization.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Override the endpoint (tests, proxies, compatible servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, req: &ChatRequest) -> Value {
        let mut body = json!({
            "model": req.model,
            "stream": true,
        });

        if req.max_tokens > 0 {
            body["max_tokens"] = json!(req.max_tokens);
        }
        if req.temperature > 0.0 {
            body["temperature"] = json!(req.temperature);
        }

        let mut messages = Vec::new();

        // OpenAI carries the system prompt as a leading message.
        if !req.system.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": req.system,
            }));
        }

        for msg in &req.messages {
            let mut api_msg = json!({
                "role": msg.role.to_string(),
                "content": convert_content(&msg.content),
            });

            if msg.role == MessageRole::Assistant {
                let tool_calls = extract_tool_calls(&msg.content);
                if !tool_calls.is_empty() {
                    let only_tool_calls = msg.content.len() == tool_calls.len();
                    api_msg["tool_calls"] = Value::Array(tool_calls);
                    if only_tool_calls {
                        if let Some(obj) = api_msg.as_object_mut() {
                            obj.remove("content");
                        }
                    }
                }
            }

            if msg.role == MessageRole::Tool {
                if let Some(ContentBlock::ToolResult(tr)) = msg.content.first() {
                    api_msg["tool_call_id"] = json!(tr.tool_use_id);
                    api_msg["content"] = json!(tr.content);
                }
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

/// Single text block → plain string; anything else → typed parts array.
fn convert_content(blocks: &[ContentBlock]) -> Value {
    if blocks.is_empty() {
        return json!("");
    }
    if let [ContentBlock::Text { text }] = blocks {
        return json!(text);
    }

    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(json!({
                "type": "text",
                "text": text,
            })),
            ContentBlock::Image { source } => parts.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", source.media_type, source.data),
                },
            })),
            // Tool uses travel in the sibling `tool_calls` field; tool
            // results as dedicated tool-role messages.
            ContentBlock::ToolUse(_) | ContentBlock::ToolResult(_) => {}
        }
    }

    Value::Array(parts)
}

fn extract_tool_calls(blocks: &[ContentBlock]) -> Vec<Value> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse(tu) => {
                let args = serde_json::to_string(&tu.input).unwrap_or_else(|_| "{}".to_string());
                Some(json!({
                    "id": tu.id,
                    "type": "function",
                    "function": {
                        "name": tu.name,
                        "arguments": args,
                    },
                }))
            }
            _ => None,
        })
        .collect()
}

impl Provider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
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
                "openai request: model={}, messages={}",
                req.model,
                req.messages.len()
            );

            let mut http = self
                .client
                .post(&self.endpoint)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key));
            if !self.organization.is_empty() {
                http = http.header("OpenAI-Organization", &self.organization);
            }

            let resp = http
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
                // This adapter's protocol has no message_start marker;
                // synthesize one before any chunk arrives.
                if tx.send(ChatEvent::MessageStart).await.is_err() {
                    return;
                }
                pump_response(resp, SseParser::default(), tx).await;
            });
            Ok(rx)
        })
    }

    fn list_models(&self) -> ProviderFuture<'_, Vec<Model>> {
        Box::pin(async move {
            Ok(vec![
                model("gpt-5.2", "GPT-5.2", 400_000, 5.00, 15.00),
                model("gpt-5", "GPT-5", 200_000, 5.00, 15.00),
                model("gpt-5-mini", "GPT-5 Mini", 200_000, 0.30, 1.20),
                model("gpt-4.1", "GPT-4.1", 1_000_000, 2.00, 8.00),
                model("o4-mini", "O4 Mini", 200_000, 1.10, 4.40),
            ])
        })
    }
}

fn model(id: &str, name: &str, context: u32, input: f64, output: f64) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        provider: "openai".to_string(),
        context_size: context,
        pricing: ModelPricing {
            input_per_1m: input,
            output_per_1m: output,
        },
    }
}

// ── SSE parsing ────────────────────────────────────────────────────

/// Accumulating tool-call fragment, keyed by stream index.
#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// State machine over OpenAI SSE `data:` payloads.
#[derive(Default)]
struct SseParser {
    calls: BTreeMap<usize, PartialCall>,
    usage: Option<Usage>,
    errored: bool,
}

impl SseParser {
    fn flush_tool_calls(&mut self, out: &mut Vec<ChatEvent>) {
        for (_, call) in std::mem::take(&mut self.calls) {
            let (Some(id), Some(name)) = (call.id, call.name) else {
                continue;
            };
            let input: Value =
                serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({}));
            out.push(ChatEvent::ToolUse(ToolUse { id, name, input }));
        }
    }
}

impl StreamParser for SseParser {
    fn parse_line(&mut self, line: &str, out: &mut Vec<ChatEvent>) -> bool {
        let Some(data) = line.strip_prefix("data: ") else {
            return false;
        };
        if data == "[DONE]" {
            // MessageDone is emitted after loop exit, in finish().
            return true;
        }

        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                out.push(ChatEvent::Error(format!("failed to parse chunk: {e}")));
                self.errored = true;
                return true;
            }
        };

        if let Some(u) = chunk.get("usage").filter(|u| !u.is_null()) {
            let input = u["prompt_tokens"].as_u64().unwrap_or(0);
            let output = u["completion_tokens"].as_u64().unwrap_or(0);
            self.usage = Some(Usage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: u["total_tokens"].as_u64().unwrap_or(input + output),
            });
        }

        let Some(choice) = chunk["choices"].get(0) else {
            return false;
        };

        if let Some(delta) = choice.get("delta") {
            if let Some(content) = delta["content"].as_str() {
                if !content.is_empty() {
                    out.push(ChatEvent::TextDelta(content.to_string()));
                }
            }

            if let Some(tool_calls) = delta["tool_calls"].as_array() {
                for tc in tool_calls {
                    let index = tc["index"].as_u64().unwrap_or(0) as usize;
                    let entry = self.calls.entry(index).or_default();
                    if let Some(id) = tc["id"].as_str() {
                        entry.id = Some(id.to_string());
                    }
                    if let Some(name) = tc["function"]["name"].as_str() {
                        entry.name = Some(name.to_string());
                    }
                    if let Some(args) = tc["function"]["arguments"].as_str() {
                        entry.arguments.push_str(args);
                    }
                }
            }
        }

        if choice["finish_reason"].as_str() == Some("tool_calls") {
            self.flush_tool_calls(out);
        }

        false
    }

    fn finish(&mut self, out: &mut Vec<ChatEvent>) {
        // Nothing may follow an in-stream error.
        if !self.errored {
            out.push(ChatEvent::MessageDone(self.usage.take()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stream::parse_lines;
    use crate::{Message, ToolResult, ToolSchema};

    #[test]
    fn tool_call_accumulation_across_chunks() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"file_read"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"pa"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"th\":\"foo\"}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                r#"data: [DONE]"#,
            ],
        );

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ChatEvent::ToolUse(ToolUse {
                id: "c1".into(),
                name: "file_read".into(),
                input: json!({"path": "foo"}),
            })
        );
        assert!(matches!(events[1], ChatEvent::MessageDone(None)));
    }

    #[test]
    fn parallel_tool_calls_keyed_by_index() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"file_read","arguments":"{}"}},{"index":1,"id":"c2","function":{"name":"bash","arguments":"{}"}}]}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
                r#"data: [DONE]"#,
            ],
        );

        let names: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolUse(tu) => Some(tu.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["file_read", "bash"]);
    }

    #[test]
    fn text_deltas_stream_through() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
                r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
                r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                r#"data: [DONE]"#,
            ],
        );

        assert_eq!(events[0], ChatEvent::TextDelta("Hel".into()));
        assert_eq!(events[1], ChatEvent::TextDelta("lo".into()));
        assert!(matches!(events[2], ChatEvent::MessageDone(None)));
    }

    #[test]
    fn usage_captured_when_present() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[
                r#"data: {"choices":[{"delta":{"content":"hi"}}],"usage":null}"#,
                r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
                r#"data: [DONE]"#,
            ],
        );

        let done = events.last().unwrap();
        assert_eq!(
            *done,
            ChatEvent::MessageDone(Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            }))
        );
    }

    #[test]
    fn missing_done_marker_still_terminates() {
        let mut parser = SseParser::default();
        let events = parse_lines(
            &mut parser,
            &[r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#],
        );
        assert!(matches!(events.last(), Some(ChatEvent::MessageDone(_))));
    }

    #[test]
    fn request_body_shape() {
        let client = OpenAiClient::new("key", "org-1").unwrap();
        let req = ChatRequest {
            model: "gpt-5".into(),
            system: "be helpful".into(),
            max_tokens: 2048,
            temperature: 0.5,
            messages: vec![Message::user("hi")],
            tools: vec![ToolSchema {
                name: "bash".into(),
                description: "run".into(),
                input_schema: json!({"type":"object"}),
            }],
        };

        let body = client.build_request(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be helpful");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "bash");
    }

    #[test]
    fn assistant_tool_calls_on_the_wire() {
        let client = OpenAiClient::new("key", "").unwrap();
        let req = ChatRequest {
            model: "gpt-5".into(),
            messages: vec![Message {
                role: MessageRole::Assistant,
                content: vec![ContentBlock::ToolUse(ToolUse {
                    id: "c1".into(),
                    name: "file_read".into(),
                    input: json!({"path":"foo"}),
                })],
            }],
            ..Default::default()
        };

        let body = client.build_request(&req);
        let msg = &body["messages"][0];
        assert_eq!(msg["tool_calls"][0]["id"], "c1");
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "file_read");
        // A pure tool-call message has no content field at all.
        assert!(msg.get("content").is_none());
    }

    #[test]
    fn tool_role_message_uses_tool_call_id() {
        let client = OpenAiClient::new("key", "").unwrap();
        let req = ChatRequest {
            model: "gpt-5".into(),
            messages: vec![Message::tool_results(vec![ToolResult {
                tool_use_id: "c1".into(),
                content: "BODY".into(),
                is_error: false,
            }])],
            ..Default::default()
        };

        let body = client.build_request(&req);
        let msg = &body["messages"][0];
        assert_eq!(msg["role"], "tool");
        assert_eq!(msg["tool_call_id"], "c1");
        assert_eq!(msg["content"], "BODY");
    }
}
