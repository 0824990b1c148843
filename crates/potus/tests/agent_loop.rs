//! End-to-end agent loop behavior against a scripted provider.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use potus::agent::{Agent, AgentConfig, AgentEvent, ContextOptions, Decision};
use potus::permissions::Settings;
use potus::providers::testing::MockProvider;
use potus::tools::{register_builtin_tools, Tool, ToolFuture, ToolOutcome, ToolRegistry};
use potus::{ChatEvent, ContentBlock, MessageRole, ToolUse, Usage};

/// A stub tool with a fixed name and output.
struct StubTool {
    name: &'static str,
    output: &'static str,
    called: Arc<AtomicBool>,
}

impl StubTool {
    fn new(name: &'static str, output: &'static str) -> (Self, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        (
            Self {
                name,
                output,
                called: called.clone(),
            },
            called,
        )
    }
}

impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "stub"
    }

    fn schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute(&self, _params: &serde_json::Value) -> ToolFuture<'_> {
        self.called.store(true, Ordering::SeqCst);
        let output = self.output;
        Box::pin(async move { ToolOutcome::ok(output) })
    }
}

fn agent_config(
    provider: Arc<MockProvider>,
    tools: Arc<ToolRegistry>,
    workdir: PathBuf,
) -> AgentConfig {
    AgentConfig {
        provider,
        tools,
        system_prompt: "You are a coding assistant.".into(),
        max_tokens: 1024,
        temperature: 0.7,
        model: "mock-model".into(),
        context: Some(ContextOptions {
            load_project_context: false,
            ..Default::default()
        }),
        model_info: None,
        workdir,
        confirm_rx: None,
        settings: None,
        context_event_tx: None,
    }
}

async fn collect(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
        events.push(e);
    }
    events
}

/// Every tool-result id in memory must match an earlier assistant
/// tool-use id.
fn assert_tool_result_linkage(messages: &[potus::Message]) {
    let mut seen_ids: Vec<String> = Vec::new();
    for msg in messages {
        for block in &msg.content {
            match block {
                ContentBlock::ToolUse(tu) => seen_ids.push(tu.id.clone()),
                ContentBlock::ToolResult(tr) => {
                    assert!(
                        seen_ids.contains(&tr.tool_use_id),
                        "dangling tool_use_id {}",
                        tr.tool_use_id
                    );
                }
                _ => {}
            }
        }
    }
}

// ── S1: pure text ──────────────────────────────────────────────────

#[tokio::test]
async fn pure_text_turn() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::new(vec![vec![
        ChatEvent::MessageStart,
        ChatEvent::TextDelta("Hello".into()),
        ChatEvent::TextDelta(" world".into()),
        ChatEvent::MessageDone(Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        })),
    ]]));
    let tools = Arc::new(ToolRegistry::new());
    let agent = Arc::new(Agent::new(agent_config(
        provider,
        tools,
        dir.path().to_path_buf(),
    )));

    let events = collect(agent.process("hi")).await;

    // TokenUpdate, TextDelta("Hello"), TextDelta(" world"), MessageDone,
    // TokenUpdate — in that order.
    assert!(matches!(events[0], AgentEvent::TokenUpdate(_)));
    assert_eq!(
        events[1],
        AgentEvent::TextDelta {
            content: "Hello".into()
        }
    );
    assert_eq!(
        events[2],
        AgentEvent::TextDelta {
            content: " world".into()
        }
    );
    assert!(matches!(events[3], AgentEvent::MessageDone { usage: Some(_) }));
    assert!(matches!(events[4], AgentEvent::TokenUpdate(_)));
    assert_eq!(events.len(), 5);

    // Memory: user + assembled assistant message.
    let messages = agent.memory().get_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].text(), "hi");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].text(), "Hello world");
}

// ── S2: tool round-trip ────────────────────────────────────────────

#[tokio::test]
async fn tool_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::new(vec![
        vec![
            ChatEvent::MessageStart,
            ChatEvent::TextDelta("reading".into()),
            ChatEvent::ToolUse(ToolUse {
                id: "t1".into(),
                name: "file_read".into(),
                input: json!({"path": "foo"}),
            }),
            ChatEvent::MessageDone(None),
        ],
        vec![
            ChatEvent::MessageStart,
            ChatEvent::TextDelta("done".into()),
            ChatEvent::MessageDone(None),
        ],
    ]));

    let tools = Arc::new(ToolRegistry::new());
    let (stub, called) = StubTool::new("file_read", "BODY");
    tools.register(stub);

    let agent = Arc::new(Agent::new(agent_config(
        provider.clone(),
        tools,
        dir.path().to_path_buf(),
    )));

    let events = collect(agent.process("read foo")).await;
    assert!(called.load(Ordering::SeqCst));

    // ToolCall precedes its ToolResult; the result carries the id and body.
    let call_pos = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolCall { .. }))
        .expect("ToolCall emitted");
    let result_pos = events
        .iter()
        .position(|e| matches!(e, AgentEvent::ToolResult { .. }))
        .expect("ToolResult emitted");
    assert!(call_pos < result_pos);

    match &events[result_pos] {
        AgentEvent::ToolResult { tool_result } => {
            assert_eq!(tool_result.tool_use_id, "t1");
            assert_eq!(tool_result.content, "BODY");
            assert!(!tool_result.is_error);
        }
        _ => unreachable!(),
    }

    // Memory: [user, assistant(text+tool_use), tool(result), assistant(text)].
    let messages = agent.memory().get_messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].text(), "reading");
    assert_eq!(messages[1].tool_uses().len(), 1);
    assert_eq!(messages[2].role, MessageRole::Tool);
    assert_eq!(messages[2].tool_results_blocks()[0].content, "BODY");
    assert_eq!(messages[3].role, MessageRole::Assistant);
    assert_eq!(messages[3].text(), "done");

    assert_tool_result_linkage(&messages);

    // The second request carried the whole exchange.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
}

// ── S3: permission deny ────────────────────────────────────────────

#[tokio::test]
async fn permission_deny_blocks_edit() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x"), "a").unwrap();

    let provider = Arc::new(MockProvider::new(vec![
        vec![
            ChatEvent::MessageStart,
            ChatEvent::ToolUse(ToolUse {
                id: "t1".into(),
                name: "file_edit".into(),
                input: json!({"path": "x", "search": "a", "replace": "b"}),
            }),
            ChatEvent::MessageDone(None),
        ],
        vec![
            ChatEvent::MessageStart,
            ChatEvent::TextDelta("understood".into()),
            ChatEvent::MessageDone(None),
        ],
    ]));

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, dir.path());

    let (confirm_tx, confirm_rx) = mpsc::channel(1);
    let mut config = agent_config(provider, tools, dir.path().to_path_buf());
    config.confirm_rx = Some(confirm_rx);
    config.settings = Some(Arc::new(Settings::load(dir.path())));
    let agent = Arc::new(Agent::new(config));

    let mut rx = agent.process("edit x");
    let mut saw_preview = false;
    let mut denied_result = None;

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::ToolPreview { content, tool_use } => {
                saw_preview = true;
                assert_eq!(tool_use.name, "file_edit");
                assert!(content.contains("-a") && content.contains("+b"), "{content}");
                confirm_tx.send(Decision::Deny).await.unwrap();
            }
            AgentEvent::ToolResult { tool_result } => {
                denied_result = Some(tool_result);
            }
            _ => {}
        }
    }

    assert!(saw_preview, "ToolPreview must be emitted before the decision");
    let result = denied_result.expect("denial still produces a tool result");
    assert!(result.is_error);
    assert!(result.content.contains("denied by user"));

    // No filesystem mutation, and the denial reached the model.
    assert_eq!(std::fs::read_to_string(dir.path().join("x")).unwrap(), "a");
    let messages = agent.memory().get_messages();
    assert!(messages
        .iter()
        .any(|m| m.role == MessageRole::Tool
            && m.tool_results_blocks()
                .iter()
                .any(|tr| tr.is_error && tr.content.contains("denied"))));
    assert_tool_result_linkage(&messages);
}

// ── Failure containment ────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_becomes_error_result_not_crash() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::new(vec![
        vec![
            ChatEvent::MessageStart,
            ChatEvent::ToolUse(ToolUse {
                id: "t1".into(),
                name: "no_such_tool".into(),
                input: json!({}),
            }),
            ChatEvent::MessageDone(None),
        ],
        vec![
            ChatEvent::MessageStart,
            ChatEvent::TextDelta("recovering".into()),
            ChatEvent::MessageDone(None),
        ],
    ]));
    let tools = Arc::new(ToolRegistry::new());
    let agent = Arc::new(Agent::new(agent_config(
        provider,
        tools,
        dir.path().to_path_buf(),
    )));

    let events = collect(agent.process("go")).await;

    let result = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult { tool_result } => Some(tool_result.clone()),
            _ => None,
        })
        .expect("error wrapped as a tool result");
    assert!(result.is_error);
    assert!(result.content.contains("tool not found"));

    // The loop kept going: the model saw the error and answered.
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentEvent::TextDelta { content } if content == "recovering")));
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));
}

// ── Iteration cap ──────────────────────────────────────────────────

#[tokio::test]
async fn iteration_cap_exits_silently() {
    let dir = tempfile::tempdir().unwrap();

    // Every iteration asks for another tool call; the loop must stop at
    // the cap without erroring.
    let scripts: Vec<Vec<ChatEvent>> = (0..potus::agent::MAX_TOOL_ITERATIONS)
        .map(|i| {
            vec![
                ChatEvent::MessageStart,
                ChatEvent::ToolUse(ToolUse {
                    id: format!("t{i}"),
                    name: "ping".into(),
                    input: json!({}),
                }),
                ChatEvent::MessageDone(None),
            ]
        })
        .collect();
    let provider = Arc::new(MockProvider::new(scripts));

    let tools = Arc::new(ToolRegistry::new());
    let (stub, _) = StubTool::new("ping", "pong");
    tools.register(stub);

    let agent = Arc::new(Agent::new(agent_config(
        provider.clone(),
        tools,
        dir.path().to_path_buf(),
    )));

    let events = collect(agent.process("loop forever")).await;

    assert_eq!(provider.requests().len(), potus::agent::MAX_TOOL_ITERATIONS);
    assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error { .. })));

    let tool_results = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolResult { .. }))
        .count();
    assert_eq!(tool_results, potus::agent::MAX_TOOL_ITERATIONS);
    assert_tool_result_linkage(&agent.memory().get_messages());
}

// ── Cancellation ───────────────────────────────────────────────────

#[tokio::test]
async fn dropping_the_event_stream_cancels_before_tools_run() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MockProvider::new(vec![vec![
        ChatEvent::MessageStart,
        ChatEvent::ToolUse(ToolUse {
            id: "t1".into(),
            name: "slow_tool".into(),
            input: json!({}),
        }),
        ChatEvent::MessageDone(None),
    ]]));

    let tools = Arc::new(ToolRegistry::new());
    let (stub, called) = StubTool::new("slow_tool", "out");
    tools.register(stub);

    let agent = Arc::new(Agent::new(agent_config(
        provider,
        tools,
        dir.path().to_path_buf(),
    )));

    // Drop the receiver immediately: the loop's first send fails and the
    // turn aborts before reaching tool execution.
    drop(agent.process("go"));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(!called.load(Ordering::SeqCst), "tool must not run after cancellation");
}
