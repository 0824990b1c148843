//! Interactive terminal front-end for the agent engine.
//!
//! Wires configuration, provider selection, the built-in tool registry,
//! and a plain readline loop: user input goes to the agent, agent events
//! stream back to the terminal, and confirmation prompts are answered on
//! stdin.
//!
//! ```sh
//! # Anthropic (reads ANTHROPIC_API_KEY)
//! potus --model anthropic/claude-sonnet-4-20250514
//!
//! # OpenAI (reads OPENAI_API_KEY, optional OPENAI_ORGANIZATION)
//! potus --model openai/gpt-5
//!
//! # Local Ollama
//! potus --model ollama/llama3.2 --ollama-endpoint http://localhost:11434
//!
//! # One-shot mode
//! potus --once "summarize src/main.rs"
//! ```

use std::io::Write as _;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use potus::agent::{Agent, AgentConfig, AgentEvent, ContextOptions, Decision};
use potus::permissions::Settings;
use potus::providers::{
    parse_model_string, AnthropicClient, OllamaClient, OpenAiClient, Provider,
};
use potus::tools::{register_builtin_tools, ToolRegistry};
use potus::Model;

const DEFAULT_SYSTEM_PROMPT: &str = "You are potus, a terminal coding assistant. You help with \
     software engineering tasks in the user's working directory. Use the available tools to \
     read, search, and modify files and to run commands. Be concise.";

/// Terminal coding assistant driven by an LLM with tool use.
#[derive(Parser)]
#[command(name = "potus", version)]
struct Cli {
    /// Model as provider/model (anthropic/…, openai/…, ollama/…)
    #[arg(long, default_value = "anthropic/claude-sonnet-4-20250514")]
    model: String,

    /// Working directory for tools and project context
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Maximum tokens per model response
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.7)]
    temperature: f64,

    /// Override the built-in system prompt
    #[arg(long)]
    system: Option<String>,

    /// Context window budget in tokens
    #[arg(long, default_value_t = 100_000)]
    context_tokens: usize,

    /// Disable automatic compaction and pruning
    #[arg(long)]
    no_auto_context: bool,

    /// Ollama endpoint (when using an ollama/ model)
    #[arg(long, default_value = "http://localhost:11434")]
    ollama_endpoint: String,

    /// Run a single prompt and exit
    #[arg(long)]
    once: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| format!("cannot resolve cwd: {e}"))?,
    };

    let (provider_name, model_id) = parse_model_string(&cli.model);
    if provider_name.is_empty() {
        return Err(format!(
            "model must be qualified as provider/model (got {})",
            cli.model
        ));
    }

    let provider = build_provider(&provider_name, &cli.ollama_endpoint)?;
    let model_info = lookup_model(provider.as_ref(), &model_id).await;

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, &workdir);

    let settings = Arc::new(Settings::load(&workdir));
    let (confirm_tx, confirm_rx) = mpsc::channel::<Decision>(1);

    let agent = Arc::new(Agent::new(AgentConfig {
        provider,
        tools,
        system_prompt: cli.system.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        max_tokens: cli.max_tokens,
        temperature: cli.temperature,
        model: model_id,
        context: Some(ContextOptions {
            max_tokens: cli.context_tokens,
            auto_compact: !cli.no_auto_context,
            auto_prune: !cli.no_auto_context,
            ..Default::default()
        }),
        model_info,
        workdir,
        confirm_rx: Some(confirm_rx),
        settings: Some(settings),
        context_event_tx: None,
    }));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if let Some(prompt) = cli.once {
        run_turn(&agent, &prompt, &confirm_tx, &mut stdin).await;
        return Ok(());
    }

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match stdin.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return Err(format!("stdin error: {e}")),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        run_turn(&agent, line, &confirm_tx, &mut stdin).await;
    }

    Ok(())
}

fn build_provider(name: &str, ollama_endpoint: &str) -> Result<Arc<dyn Provider>, String> {
    match name {
        "anthropic" => {
            let key = std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| "ANTHROPIC_API_KEY not set".to_string())?;
            Ok(Arc::new(AnthropicClient::new(key)?))
        }
        "openai" => {
            let key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| "OPENAI_API_KEY not set".to_string())?;
            let org = std::env::var("OPENAI_ORGANIZATION").unwrap_or_default();
            Ok(Arc::new(OpenAiClient::new(key, org)?))
        }
        "ollama" => Ok(Arc::new(OllamaClient::new(ollama_endpoint)?)),
        other => Err(format!("unknown provider: {other}")),
    }
}

async fn lookup_model(provider: &dyn Provider, model_id: &str) -> Option<Model> {
    match provider.list_models().await {
        Ok(models) => models.into_iter().find(|m| m.id == model_id),
        Err(_) => None,
    }
}

/// Drive one turn: forward agent events to the terminal and answer
/// confirmation prompts from stdin.
async fn run_turn(
    agent: &Arc<Agent>,
    prompt: &str,
    confirm_tx: &mpsc::Sender<Decision>,
    stdin: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
) {
    let mut events = agent.process(prompt);

    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::TextDelta { content } => {
                print!("{content}");
                std::io::stdout().flush().ok();
            }
            AgentEvent::ToolCall { tool_use } => {
                println!("\n[tool] {}({})", tool_use.name, tool_use.input);
            }
            AgentEvent::ToolResult { tool_result } => {
                let status = if tool_result.is_error { "error" } else { "ok" };
                let preview: String = tool_result.content.chars().take(200).collect();
                println!("[tool {status}] {preview}");
            }
            AgentEvent::ToolPreview { content, tool_use } => {
                println!("\n--- confirm {} ---", tool_use.name);
                println!("{content}");
                let decision = ask_decision(stdin).await;
                if confirm_tx.send(decision).await.is_err() {
                    break;
                }
            }
            AgentEvent::MessageDone { .. } => {
                println!();
            }
            AgentEvent::Error { message } => {
                eprintln!("\nerror: {message}");
            }
            AgentEvent::TokenUpdate(update) => {
                if update.at_warning {
                    eprintln!(
                        "[context] {:.0}% of {} tokens used",
                        update.usage_percent, update.max_tokens
                    );
                }
            }
            AgentEvent::ContextUpdate { content } => {
                eprintln!("[context] {content}");
            }
        }
    }
}

async fn ask_decision(stdin: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>) -> Decision {
    loop {
        print!("approve? [y]es / [n]o / [a]lways: ");
        std::io::stdout().flush().ok();

        let answer = match stdin.next_line().await {
            Ok(Some(line)) => line.trim().to_lowercase(),
            _ => return Decision::Deny,
        };

        match answer.as_str() {
            "y" | "yes" => return Decision::Approve,
            "n" | "no" => return Decision::Deny,
            "a" | "always" => return Decision::AlwaysAllow,
            _ => continue,
        }
    }
}
