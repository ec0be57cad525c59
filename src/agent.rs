//! Agent 应答协议
//!
//! `Responder` 给定会话快照、全局指令与 AgentSpec，产出一条消息、Pass 或错误。
//! Pass 判定：去除首尾空白后与 `[PASS]` 完全相等（忽略 ASCII 大小写）；
//! 仅提及该标记的消息、或被 Markdown 包裹的标记都不算 Pass。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{CompletionRequest, LlmClient, LlmError, ReasoningEffort};
use crate::memory::{render_channel, Message, USER_AUTHOR};
use crate::roster::AgentSpec;

/// 保留的 Pass 标记
pub const PASS_TOKEN: &str = "[PASS]";

/// 参与者列表中提示词摘要的最大字符数
const PROMPT_SUMMARY_CHARS: usize = 100;

pub fn is_pass(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(PASS_TOKEN)
}

/// 单个回合的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Message(String),
    Pass,
    Error(LlmError),
}

impl Outcome {
    /// 将模型原始回复分类；空回复视为错误，不写入日志
    pub fn from_reply(reply: &str) -> Self {
        let trimmed = reply.trim();
        if trimmed.is_empty() {
            Outcome::Error(LlmError::EmptyResponse)
        } else if is_pass(trimmed) {
            Outcome::Pass
        } else {
            Outcome::Message(trimmed.to_string())
        }
    }
}

/// 回合上下文：一次 respond 所需的全部只读输入
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub history: Vec<Message>,
    pub global_instructions: String,
    pub roster: Arc<Vec<AgentSpec>>,
    pub max_tokens: u32,
}

/// 应答者：LLM Agent 或测试脚本
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, turn: &TurnContext, spec: &AgentSpec) -> Outcome;
}

fn prompt_summary(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > PROMPT_SUMMARY_CHARS {
        let cut: String = first_line.chars().take(PROMPT_SUMMARY_CHARS).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

/// 参与者列表 + 全局指令 + Pass 协议说明，附加在每个 Agent 的系统提示之后
pub fn build_global_context(roster: &[AgentSpec], me: &AgentSpec, instructions: &str) -> String {
    let mut ctx = String::from("--- Conversation participants ---\n");
    for agent in roster {
        if agent.id == me.id {
            ctx.push_str(&format!("- {} (you): {}\n", agent.name, prompt_summary(&agent.prompt)));
        } else {
            ctx.push_str(&format!("- {}: {}\n", agent.name, prompt_summary(&agent.prompt)));
        }
    }
    ctx.push_str(&format!("- {}: Human participant\n", USER_AUTHOR));

    let instructions = instructions.trim();
    if !instructions.is_empty() {
        ctx.push_str("\n--- Instructions for all participants ---\n");
        ctx.push_str(instructions);
        ctx.push('\n');
    }

    ctx.push_str(&format!(
        "\nIf you have nothing meaningful to add right now, reply with exactly {} and nothing else.",
        PASS_TOKEN
    ));
    ctx
}

pub fn build_system_prompt(turn: &TurnContext, spec: &AgentSpec) -> String {
    let context = build_global_context(&turn.roster, spec, &turn.global_instructions);
    if spec.prompt.trim().is_empty() {
        format!("You are {}.\n\n{}", spec.name, context)
    } else {
        format!("{}\n\n{}", spec.prompt.trim(), context)
    }
}

/// LLM 驱动的应答者：每次调用带超时，超时结果为 `Error(Timeout)`
pub struct LlmResponder {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    default_effort: Option<ReasoningEffort>,
}

impl LlmResponder {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            default_effort: None,
        }
    }

    pub fn with_default_effort(mut self, effort: Option<ReasoningEffort>) -> Self {
        self.default_effort = effort;
        self
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(&self, turn: &TurnContext, spec: &AgentSpec) -> Outcome {
        let request = CompletionRequest {
            system_prompt: build_system_prompt(turn, spec),
            conversation: render_channel(&turn.history),
            model: spec.model.clone(),
            max_tokens: turn.max_tokens,
            reasoning_effort: spec.reasoning_effort.or(self.default_effort),
        };

        tracing::debug!(agent = %spec.name, model = %spec.model, "Requesting completion");
        match tokio::time::timeout(self.timeout, self.client.complete(request)).await {
            Ok(Ok(reply)) => Outcome::from_reply(&reply),
            Ok(Err(e)) => Outcome::Error(e),
            Err(_) => Outcome::Error(LlmError::Timeout(self.timeout.as_secs())),
        }
    }
}
