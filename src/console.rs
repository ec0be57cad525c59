//! 行式控制台：从 stdin 读取命令或用户消息，把事件打印到 stdout
//!
//! 以 `/` 开头的行是控制命令，其余非空行作为用户消息注入会话。

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::{
    AgentStatus, Command, ControlHandle, Reply, ShutdownManager, ShutdownReason, StatusSnapshot,
    ZooEvent,
};
use crate::roster::{AgentId, AgentSpec};

pub const HELP: &str = "\
Commands:
  /pause                 pause between turns
  /resume                resume after pause
  /stop                  stop the conversation
  /restart               clear the conversation and start over
  /status                show run state and agents
  /delay N               seconds to wait after each agent message (0-300)
  /max-tokens N          completion budget per turn (100-4000)
  /instructions TEXT     set instructions shared by all agents
  /add NAME | PROMPT     add an agent
  /edit NAME_OR_ID | PROMPT  replace an agent's prompt from its next turn
  /remove NAME_OR_ID     remove an agent
  /help                  show this help
  /quit                  stop and exit
Any other line is sent to the conversation as the User.";

/// 一行输入的解析结果
#[derive(Debug, Clone)]
pub enum ConsoleInput {
    Command(Command),
    /// 需要按名字解析成 id 的移除
    Remove(String),
    /// 替换提示词，名字与模型保持不变
    Edit { key: String, prompt: String },
    Status,
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleInput::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ConsoleInput::Command(Command::InjectUserMessage(line.to_string())));
    };

    let (verb, arg) = match rest.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (rest, ""),
    };

    let input = match verb.to_ascii_lowercase().as_str() {
        "pause" => ConsoleInput::Command(Command::Pause),
        "resume" => ConsoleInput::Command(Command::Resume),
        "stop" => ConsoleInput::Command(Command::Stop),
        "restart" => ConsoleInput::Command(Command::Restart),
        "status" => ConsoleInput::Status,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        "delay" => {
            let secs = arg
                .parse::<u64>()
                .map_err(|_| format!("usage: /delay N (got '{}')", arg))?;
            ConsoleInput::Command(Command::SetDelay(secs))
        }
        "max-tokens" | "max_tokens" => {
            let n = arg
                .parse::<u32>()
                .map_err(|_| format!("usage: /max-tokens N (got '{}')", arg))?;
            ConsoleInput::Command(Command::SetMaxTokens(n))
        }
        "instructions" => ConsoleInput::Command(Command::SetGlobalInstructions(arg.to_string())),
        "add" => {
            let (name, prompt) = arg.split_once('|').unwrap_or((arg, ""));
            let name = name.trim();
            if name.is_empty() {
                return Err("usage: /add NAME | PROMPT".into());
            }
            ConsoleInput::Command(Command::AddAgent(AgentSpec::new(name, prompt.trim())))
        }
        "edit" => {
            let Some((key, prompt)) = arg.split_once('|') else {
                return Err("usage: /edit NAME_OR_ID | PROMPT".into());
            };
            let key = key.trim();
            if key.is_empty() {
                return Err("usage: /edit NAME_OR_ID | PROMPT".into());
            }
            ConsoleInput::Edit {
                key: key.to_string(),
                prompt: prompt.trim().to_string(),
            }
        }
        "remove" => {
            if arg.is_empty() {
                return Err("usage: /remove NAME_OR_ID".into());
            }
            ConsoleInput::Remove(arg.to_string())
        }
        other => return Err(format!("unknown command '/{}', try /help", other)),
    };
    Ok(input)
}

pub fn format_status(status: &StatusSnapshot) -> String {
    let mut out = format!(
        "state: {}  messages: {}  ~tokens: {}  stall: {}{}  delay: {}s  max_tokens: {}",
        status.run_state,
        status.message_count,
        status.total_tokens,
        status.stall_count,
        if status.pending_user_input { " (waiting for you)" } else { "" },
        status.delay_secs,
        status.max_tokens,
    );
    if let Some(holder) = &status.turn_holder {
        out.push_str(&format!("\nspeaking: {}", holder));
    }
    for agent in &status.agents {
        out.push_str(&format!("\n  - {} [{}] {}", agent.name, agent.id, agent.model));
        if agent.degraded {
            out.push_str(&format!(" DEGRADED ({} errors)", agent.consecutive_errors));
        }
    }
    if let Some(err) = &status.last_error {
        out.push_str(&format!("\nlast error: {}", err));
    }
    out
}

fn find_agent<'a>(status: &'a StatusSnapshot, key: &str) -> Option<&'a AgentStatus> {
    status
        .agents
        .iter()
        .find(|a| a.id.as_str() == key || a.name.eq_ignore_ascii_case(key))
}

fn resolve_agent(status: &StatusSnapshot, key: &str) -> AgentId {
    find_agent(status, key)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| AgentId::from(key))
}

/// 以当前名字、模型与推理强度构造编辑命令；未知 Agent 交给编排器拒绝
fn edit_command(status: &StatusSnapshot, key: &str, prompt: &str) -> Command {
    match find_agent(status, key) {
        Some(agent) => {
            let mut spec = AgentSpec::new(agent.name.clone(), prompt).with_model(agent.model.clone());
            spec.reasoning_effort = agent.reasoning_effort;
            Command::EditAgent(agent.id.clone(), spec)
        }
        None => Command::EditAgent(AgentId::from(key), AgentSpec::new(key, prompt)),
    }
}

/// 读取 stdin 直到 EOF、/quit 或关闭信号
pub async fn run_console(control: ControlHandle, shutdown: Arc<ShutdownManager>) -> anyhow::Result<()> {
    let token = shutdown.token();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a message to join the conversation, /help for commands.");

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::debug!("stdin closed");
            break;
        };

        match parse_line(&line) {
            Ok(ConsoleInput::Empty) => {}
            Ok(ConsoleInput::Help) => println!("{}", HELP),
            Ok(ConsoleInput::Status) => println!("{}", format_status(&control.status())),
            Ok(ConsoleInput::Quit) => {
                shutdown.shutdown(&control, ShutdownReason::UserInitiated).await;
                break;
            }
            Ok(ConsoleInput::Remove(key)) => {
                let id = resolve_agent(&control.status(), &key);
                report(control.send(Command::RemoveAgent(id)).await);
            }
            Ok(ConsoleInput::Edit { key, prompt }) => {
                let cmd = edit_command(&control.status(), &key, &prompt);
                report(control.send(cmd).await);
            }
            Ok(ConsoleInput::Command(cmd)) => report(control.send(cmd).await),
            Err(usage) => println!("{}", usage),
        }
    }
    Ok(())
}

fn report(result: Result<Reply, crate::core::ZooError>) {
    match result {
        Ok(Reply::Queued) => println!("(queued until the current speaker finishes)"),
        Ok(Reply::AgentAdded(id)) => println!("(agent added: {})", id),
        Ok(_) => {}
        Err(e) => println!("error: {}", e),
    }
}

/// 把会话事件打印到 stdout
pub async fn print_events(mut events: broadcast::Receiver<ZooEvent>, token: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Console fell behind, events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &ZooEvent) -> Option<String> {
    let line = match event {
        ZooEvent::MessageAppended(msg) => {
            format!("\n[{}] {}\n{}", msg.seq, msg.author.display_name(), msg.body)
        }
        ZooEvent::TurnStarted { .. } | ZooEvent::StateChanged(_) => return None,
        ZooEvent::AgentPassed { agent } => format!("({} passed)", agent),
        ZooEvent::AgentFailed { agent, error } => format!("({} failed: {})", agent, error),
        ZooEvent::AgentDegraded { agent } => format!("({} is degraded after repeated errors)", agent),
        ZooEvent::ResultDiscarded { agent } => format!("({}'s reply was discarded)", agent),
        ZooEvent::Stalled { passes } => {
            format!("(all agents passed {} times in a row, waiting for your message)", passes)
        }
        ZooEvent::WriteFailed(err) => format!("(write failed, paused: {})", err),
        ZooEvent::MessageCapReached(cap) => format!("(message cap {} reached, stopped)", cap),
        ZooEvent::LogReset => "(conversation cleared)".to_string(),
    };
    Some(line)
}
