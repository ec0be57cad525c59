//! 控制通道：命令经 mpsc 送入编排循环，结果经 oneshot 返回；
//! 状态经 watch 读取，事件经 broadcast 订阅。

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::core::{StatusSnapshot, ZooError, ZooEvent};
use crate::roster::{AgentId, AgentSpec};

/// 发往编排循环的控制命令
#[derive(Debug, Clone)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    /// 清空日志并回到 Idle
    Restart,
    InjectUserMessage(String),
    AddAgent(AgentSpec),
    RemoveAgent(AgentId),
    EditAgent(AgentId, AgentSpec),
    SetGlobalInstructions(String),
    SetDelay(u64),
    SetMaxTokens(u32),
    /// 结束循环任务
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    /// 用户消息已写入，附带序号
    Appended(u64),
    /// 有 Agent 正在生成，用户消息排队等待
    Queued,
    AgentAdded(AgentId),
}

pub(crate) type Request = (Command, oneshot::Sender<Result<Reply, ZooError>>);

/// 控制面句柄，可自由 clone
#[derive(Debug, Clone)]
pub struct ControlHandle {
    cmd_tx: mpsc::UnboundedSender<Request>,
    status_rx: watch::Receiver<StatusSnapshot>,
    event_tx: broadcast::Sender<ZooEvent>,
}

impl ControlHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<Request>,
        status_rx: watch::Receiver<StatusSnapshot>,
        event_tx: broadcast::Sender<ZooEvent>,
    ) -> Self {
        Self {
            cmd_tx,
            status_rx,
            event_tx,
        }
    }

    pub async fn send(&self, cmd: Command) -> Result<Reply, ZooError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send((cmd, reply_tx))
            .map_err(|_| ZooError::Closed)?;
        reply_rx.await.map_err(|_| ZooError::Closed)?
    }

    pub async fn pause(&self) -> Result<Reply, ZooError> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<Reply, ZooError> {
        self.send(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<Reply, ZooError> {
        self.send(Command::Stop).await
    }

    pub async fn restart(&self) -> Result<Reply, ZooError> {
        self.send(Command::Restart).await
    }

    pub async fn inject(&self, text: impl Into<String>) -> Result<Reply, ZooError> {
        self.send(Command::InjectUserMessage(text.into())).await
    }

    pub async fn add_agent(&self, spec: AgentSpec) -> Result<AgentId, ZooError> {
        match self.send(Command::AddAgent(spec)).await? {
            Reply::AgentAdded(id) => Ok(id),
            other => Err(ZooError::InvalidCommand(format!(
                "unexpected reply to AddAgent: {:?}",
                other
            ))),
        }
    }

    pub async fn remove_agent(&self, id: impl Into<AgentId>) -> Result<Reply, ZooError> {
        self.send(Command::RemoveAgent(id.into())).await
    }

    pub async fn edit_agent(&self, id: impl Into<AgentId>, spec: AgentSpec) -> Result<Reply, ZooError> {
        self.send(Command::EditAgent(id.into(), spec)).await
    }

    pub async fn set_global_instructions(&self, text: impl Into<String>) -> Result<Reply, ZooError> {
        self.send(Command::SetGlobalInstructions(text.into())).await
    }

    pub async fn set_delay(&self, secs: u64) -> Result<Reply, ZooError> {
        self.send(Command::SetDelay(secs)).await
    }

    pub async fn set_max_tokens(&self, n: u32) -> Result<Reply, ZooError> {
        self.send(Command::SetMaxTokens(n)).await
    }

    pub async fn quit(&self) -> Result<Reply, ZooError> {
        self.send(Command::Quit).await
    }

    /// 最近一次发布的状态（可能略旧，但自洽）
    pub fn status(&self) -> StatusSnapshot {
        self.status_rx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ZooEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
