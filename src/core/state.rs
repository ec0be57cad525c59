//! 状态定义：RunState 与供控制面读取的 StatusSnapshot 投影
//!
//! 控制面只读取轻量快照（可能略旧但自洽）；完整状态由编排循环持有。

use std::fmt;

use serde::Serialize;

use crate::llm::ReasoningEffort;
use crate::memory::Message;
use crate::roster::AgentId;

/// 运行状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// 日志为空，等待第一条用户消息
    Idle,
    Running,
    /// 回合之间挂起；进行中的调用照常完成
    Paused,
    /// 检测到停滞（或名册为空），等待用户消息
    AwaitingUser,
    /// 终止，只能通过 Restart 重新开始
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::AwaitingUser => "awaiting-user",
            RunState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentStatus {
    pub id: AgentId,
    pub name: String,
    pub model: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub degraded: bool,
    pub consecutive_errors: u32,
}

/// 状态快照
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub run_state: RunState,
    /// 当前持有回合（正在生成）的 Agent 名
    pub turn_holder: Option<String>,
    pub stall_count: usize,
    pub pending_user_input: bool,
    pub recent_messages: Vec<Message>,
    pub agents: Vec<AgentStatus>,
    pub message_count: usize,
    pub total_tokens: usize,
    pub delay_secs: u64,
    pub max_tokens: u32,
    pub last_error: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            run_state: RunState::Idle,
            turn_holder: None,
            stall_count: 0,
            pending_user_input: false,
            recent_messages: Vec::new(),
            agents: Vec::new(),
            message_count: 0,
            total_tokens: 0,
            delay_secs: 0,
            max_tokens: 512,
            last_error: None,
        }
    }
}

impl StatusSnapshot {
    pub fn agent(&self, name: &str) -> Option<&AgentStatus> {
        self.agents.iter().find(|a| a.name == name)
    }
}
