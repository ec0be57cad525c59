//! Zoo - 多智能体轮流对话中继
//!
//! 入口：初始化日志、加载配置 / params / 设置，启动编排器与行式控制台，并运行到退出。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use zoo::config::{load_config, load_params, Params};
use zoo::console::{print_events, run_console};
use zoo::core::{ShutdownManager, ShutdownReason};
use zoo::llm::{LlmClient, MockLlmClient, OpenAiClient};
use zoo::memory::{parse_channel, ConversationLog, FileChannelStore};
use zoo::roster::Roster;
use zoo::settings::{Settings, SettingsStore};
use zoo::{agent::LlmResponder, observability, spawn_orchestrator, RunOptions, RunState};

const DEFAULT_PARAMS: &str = "params.toml";

#[derive(Parser, Debug)]
#[command(name = "zoo")]
#[command(version)]
#[command(about = "Run a multi-agent conversation via a shared channel", long_about = None)]
struct Cli {
    /// Params file with the opening message and [agentN] tables (default: params.toml if present)
    #[arg(short, long)]
    params: Option<PathBuf>,
    /// Extra config file layered over config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,
    /// Opening user message (overrides the params file)
    #[arg(short, long)]
    message: Option<String>,
    /// Stop once the channel holds this many messages
    #[arg(long)]
    max_messages: Option<usize>,
    /// Name or id of the agent that speaks first
    #[arg(long)]
    first: Option<String>,
    /// Seconds to wait after each agent message
    #[arg(long)]
    delay: Option<u64>,
    /// Completion budget per turn
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Channel file path
    #[arg(long)]
    channel: Option<PathBuf>,
    /// Settings file path
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Use the offline mock model
    #[arg(long)]
    mock: bool,
    /// Continue the existing channel instead of starting fresh
    #[arg(long)]
    resume: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_params(cli: &Cli, default_model: &str) -> anyhow::Result<Params> {
    match &cli.params {
        Some(path) => load_params(path, default_model),
        None if Path::new(DEFAULT_PARAMS).exists() => {
            load_params(Path::new(DEFAULT_PARAMS), default_model)
        }
        None => Ok(Params::default()),
    }
}

fn open_log(path: &Path, resume: bool) -> anyhow::Result<ConversationLog> {
    let store = FileChannelStore::new(path)
        .with_context(|| format!("Failed to prepare channel file {}", path.display()))?;
    if resume {
        let raw = store
            .read_all()
            .with_context(|| format!("Failed to read channel file {}", path.display()))?;
        let parsed = parse_channel(&raw);
        tracing::info!(messages = parsed.len(), "Resuming {}", path.display());
        Ok(ConversationLog::resume(Box::new(store), parsed))
    } else {
        ConversationLog::open(Box::new(store)).context("Failed to reset channel file")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init(if cli.verbose { "debug" } else { "info" });

    let cfg = load_config(cli.config.as_deref()).context("Failed to load config")?;
    let params = read_params(&cli, &cfg.llm.default_model)?;

    let store = SettingsStore::new(cli.settings.clone().unwrap_or(cfg.run.settings_path.clone()));
    let settings = store.load().context("Failed to load settings")?;

    // params 中定义了 Agent 时覆盖设置中的名册
    let specs = if params.agents.is_empty() {
        settings.agents.clone()
    } else {
        params.agents.clone()
    };
    let roster = Roster::from_specs(specs).context("Invalid agent roster")?;

    let first_agent = match cli.first.as_deref().or(cfg.run.first_agent.as_deref()) {
        Some(key) => match roster.find(key) {
            Some(spec) => Some(spec.id.clone()),
            None => bail!("Starting agent '{}' is not in the roster", key),
        },
        None => None,
    };

    let initial = Settings {
        agents: roster.snapshot().to_vec(),
        ..settings.clone()
    };
    if let Err(e) = store.save(&initial) {
        tracing::warn!(error = %e, "Failed to save settings");
    }

    let channel_path = cli
        .channel
        .clone()
        .or(params.channel.clone())
        .unwrap_or(cfg.run.channel_path.clone());
    let log = Arc::new(open_log(&channel_path, cli.resume)?);

    let use_mock = cli.mock
        || cfg.llm.provider.eq_ignore_ascii_case("mock")
        || std::env::var("OPENAI_API_KEY").is_err();
    let openai = (!use_mock).then(|| Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), None)));
    let client: Arc<dyn LlmClient> = match &openai {
        Some(client) => {
            tracing::info!("Using OpenAI-compatible completion service");
            Arc::clone(client) as Arc<dyn LlmClient>
        }
        None => {
            tracing::warn!("No API key set or mock requested, using Mock LLM");
            Arc::new(MockLlmClient::default())
        }
    };
    let responder = LlmResponder::new(client, Duration::from_secs(cfg.run.completion_timeout_secs))
        .with_default_effort(cfg.llm.default_reasoning_effort.or(Some(settings.default_reasoning_effort)));

    let mut options = RunOptions::from_settings(&settings);
    if let Some(delay) = cli.delay.or(cfg.run.delay_secs) {
        options.delay_secs = delay;
    }
    if let Some(max_tokens) = cli.max_tokens.or(cfg.run.max_tokens) {
        options.max_tokens = max_tokens;
    }
    options.max_messages = cli.max_messages.or(cfg.run.max_messages);
    options.first_agent = first_agent;
    options.status_window = cfg.run.status_window;
    options.settings = Some(store);

    tracing::info!(
        agents = roster.len(),
        channel = %channel_path.display(),
        "Starting conversation"
    );
    let (control, task) = spawn_orchestrator(log, Arc::new(responder), roster, options);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers(control.clone());
    let printer = tokio::spawn(print_events(control.subscribe(), shutdown.token()));

    if let Some(message) = cli.message.clone().or(params.message.clone()) {
        control
            .inject(message)
            .await
            .context("Failed to post the opening message")?;
    }

    let console = tokio::spawn(run_console(control.clone(), shutdown.clone()));
    tokio::select! {
        _ = shutdown.wait_for_shutdown() => {}
        result = console => {
            result.context("Console task panicked")??;
            // stdin 已关闭：无人值守运行，直到会话停止
            let mut status = control.watch_status();
            tokio::select! {
                _ = status.wait_for(|s| s.run_state == RunState::Stopped) => {}
                _ = shutdown.wait_for_shutdown() => {}
            }
        }
    }

    shutdown.shutdown(&control, ShutdownReason::UserInitiated).await;
    task.await.context("Orchestrator task panicked")?;
    let _ = printer.await;

    if let Some(client) = openai {
        let (prompt, completion, total) = client.token_usage();
        tracing::info!(prompt, completion, total, "Token usage");
    }
    Ok(())
}
