//! 编排事件：通过 broadcast 推送给实时查看者（控制台、Web 等）

use crate::core::RunState;
use crate::memory::Message;

#[derive(Debug, Clone)]
pub enum ZooEvent {
    /// 用户或 Agent 的消息已写入日志
    MessageAppended(Message),
    /// 开始一个回合
    TurnStarted { agent: String },
    AgentPassed { agent: String },
    /// 补全失败（不写入会话）
    AgentFailed { agent: String, error: String },
    AgentDegraded { agent: String },
    /// 进行中的结果因 Stop / Restart 被丢弃
    ResultDiscarded { agent: String },
    StateChanged(RunState),
    /// 所有 Agent 连续 Pass
    Stalled { passes: usize },
    WriteFailed(String),
    MessageCapReached(usize),
    LogReset,
}
