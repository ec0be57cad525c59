//! 编排器：主控循环
//!
//! 单个 tokio 任务持有调度器、名册与设置；控制面经 cmd 通道发送命令，
//! 经 status（watch）读取快照、经 events（broadcast）订阅事件。
//! 回合进行中循环在补全 future 与命令队列之间 select，因此暂停、名册编辑、
//! 用户输入在调用期间照常受理；调用本身不会被 Pause / Stop 打断。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::agent::{Outcome, Responder, TurnContext};
use crate::core::control::Request;
use crate::core::{
    AgentStatus, Command, ControlHandle, RecoveryAction, RecoveryEngine, Reply, RunState,
    StatusSnapshot, TurnScheduler, ZooError, ZooEvent,
};
use crate::llm::ReasoningEffort;
use crate::memory::{Author, ConversationLog, Message};
use crate::roster::{AgentId, AgentSpec, Roster};
use crate::settings::{clamp_delay, clamp_max_tokens, Settings, SettingsStore};

const EVENT_CAPACITY: usize = 256;

/// 启动参数
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub delay_secs: u64,
    pub max_tokens: u32,
    /// 日志长度达到该值即 Stop
    pub max_messages: Option<usize>,
    pub first_agent: Option<AgentId>,
    /// 状态快照中携带的最近消息条数
    pub status_window: usize,
    pub global_instructions: String,
    pub default_reasoning_effort: ReasoningEffort,
    /// 设置变更写回的位置；None 时不持久化
    pub settings: Option<SettingsStore>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            delay_secs: 0,
            max_tokens: 512,
            max_messages: None,
            first_agent: None,
            status_window: 20,
            global_instructions: String::new(),
            default_reasoning_effort: ReasoningEffort::Medium,
            settings: None,
        }
    }
}

impl RunOptions {
    /// 以已加载的设置为基础
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            delay_secs: settings.delay_seconds,
            max_tokens: settings.max_tokens,
            global_instructions: settings.global_prompt.clone(),
            default_reasoning_effort: settings.default_reasoning_effort,
            ..Self::default()
        }
    }
}

/// 启动编排循环，返回控制句柄与任务句柄
pub fn spawn_orchestrator(
    log: Arc<ConversationLog>,
    responder: Arc<dyn Responder>,
    roster: Roster,
    options: RunOptions,
) -> (ControlHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Request>();
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
    let (event_tx, _) = broadcast::channel::<ZooEvent>(EVENT_CAPACITY);

    let orchestrator = Orchestrator::new(log, responder, roster, options, status_tx, event_tx.clone());
    let handle = ControlHandle::new(cmd_tx, status_rx, event_tx);
    let task = tokio::spawn(orchestrator.run(cmd_rx));
    (handle, task)
}

struct Orchestrator {
    log: Arc<ConversationLog>,
    responder: Arc<dyn Responder>,
    roster: Roster,
    scheduler: TurnScheduler,
    recovery: RecoveryEngine,
    settings: Option<SettingsStore>,
    default_reasoning_effort: ReasoningEffort,
    global_instructions: String,
    delay_secs: u64,
    max_tokens: u32,
    max_messages: Option<usize>,
    status_window: usize,
    /// Restart 时递增；回合结束时 epoch 不同则丢弃结果
    epoch: u64,
    turn_holder: Option<String>,
    queued_user: VecDeque<String>,
    delay_until: Option<Instant>,
    last_error: Option<String>,
    published_state: RunState,
    quit: bool,
    status_tx: watch::Sender<StatusSnapshot>,
    event_tx: broadcast::Sender<ZooEvent>,
}

impl Orchestrator {
    fn new(
        log: Arc<ConversationLog>,
        responder: Arc<dyn Responder>,
        roster: Roster,
        options: RunOptions,
        status_tx: watch::Sender<StatusSnapshot>,
        event_tx: broadcast::Sender<ZooEvent>,
    ) -> Self {
        Self {
            log,
            responder,
            roster,
            scheduler: TurnScheduler::new(options.first_agent),
            recovery: RecoveryEngine::new(),
            settings: options.settings,
            default_reasoning_effort: options.default_reasoning_effort,
            global_instructions: options.global_instructions,
            delay_secs: clamp_delay(options.delay_secs),
            max_tokens: clamp_max_tokens(options.max_tokens),
            max_messages: options.max_messages,
            status_window: options.status_window,
            epoch: 0,
            turn_holder: None,
            queued_user: VecDeque::new(),
            delay_until: None,
            last_error: None,
            published_state: RunState::Idle,
            quit: false,
            status_tx,
            event_tx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Request>) {
        tracing::info!(
            agents = self.roster.len(),
            delay_secs = self.delay_secs,
            max_tokens = self.max_tokens,
            "Orchestrator started"
        );
        // 续接已有会话时直接进入 Running
        if !self.log.is_empty().await {
            self.scheduler.user_message();
        }
        self.publish().await;

        while !self.quit {
            if !self.scheduler.can_take_turn() {
                match cmd_rx.recv().await {
                    Some(req) => self.handle_request(req).await,
                    None => break,
                }
                continue;
            }

            if let Some(deadline) = self.delay_until {
                if Instant::now() < deadline {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => self.delay_until = None,
                        req = cmd_rx.recv() => match req {
                            Some(req) => self.handle_request(req).await,
                            None => break,
                        },
                    }
                    continue;
                }
                self.delay_until = None;
            }

            self.take_turn(&mut cmd_rx).await;
        }

        tracing::info!("Orchestrator exited");
    }

    async fn take_turn(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Request>) {
        tokio::task::yield_now().await;

        let roster = self.roster.snapshot();
        let Some(spec) = self.scheduler.select_next(&roster) else {
            tracing::info!("Roster is empty, waiting for agents or user input");
            self.scheduler.await_user();
            self.publish().await;
            return;
        };

        let turn = TurnContext {
            history: self.log.snapshot().await,
            global_instructions: self.global_instructions.clone(),
            roster,
            max_tokens: self.max_tokens,
        };
        let epoch = self.epoch;
        self.turn_holder = Some(spec.name.clone());
        tracing::debug!(agent = %spec.name, history = turn.history.len(), "Turn started");
        self.emit(ZooEvent::TurnStarted {
            agent: spec.name.clone(),
        });
        self.publish().await;

        let responder = Arc::clone(&self.responder);
        let call_spec = spec.clone();
        let call = async move { responder.respond(&turn, &call_spec).await };
        tokio::pin!(call);

        let outcome = loop {
            tokio::select! {
                outcome = &mut call => break Some(outcome),
                req = cmd_rx.recv() => match req {
                    Some(req) => {
                        self.handle_request(req).await;
                        if self.quit {
                            break None;
                        }
                    }
                    None => {
                        self.quit = true;
                        break None;
                    }
                },
            }
        };
        self.turn_holder = None;

        let Some(outcome) = outcome else {
            return;
        };
        if self.epoch != epoch || self.scheduler.state() == RunState::Stopped {
            tracing::info!(agent = %spec.name, "Discarding result of interrupted turn");
            self.emit(ZooEvent::ResultDiscarded { agent: spec.name });
            self.publish().await;
            return;
        }

        self.apply_outcome(&spec, outcome).await;
        let _ = self.flush_queued_user().await;
        self.publish().await;
    }

    async fn apply_outcome(&mut self, spec: &AgentSpec, outcome: Outcome) {
        match outcome {
            Outcome::Message(body) => {
                let author = Author::agent(spec.id.clone(), spec.name.clone());
                match self.log.append(author, body).await {
                    Ok(msg) => {
                        tracing::info!(seq = msg.seq, agent = %spec.name, "Agent message appended");
                        self.scheduler.record_message(&spec.id);
                        self.forget_if_removed(&spec.id);
                        self.emit(ZooEvent::MessageAppended(msg));
                        if self.delay_secs > 0 {
                            self.delay_until =
                                Some(Instant::now() + Duration::from_secs(self.delay_secs));
                        }
                        self.check_cap().await;
                    }
                    Err(e) => self.on_write_failure(&e),
                }
            }
            Outcome::Pass => {
                tracing::info!(agent = %spec.name, "Agent passed");
                let effect = self.scheduler.record_pass(&spec.id, self.roster.len());
                self.forget_if_removed(&spec.id);
                self.emit(ZooEvent::AgentPassed {
                    agent: spec.name.clone(),
                });
                if effect.stalled {
                    self.on_stall();
                }
            }
            Outcome::Error(err) => {
                let err = ZooError::Completion(err);
                let action = self.recovery.handle(&err);
                tracing::warn!(agent = %spec.name, error = %err, ?action, "Completion failed");
                self.last_error = Some(format!("{}: {}", spec.name, err));
                self.emit(ZooEvent::AgentFailed {
                    agent: spec.name.clone(),
                    error: err.to_string(),
                });
                let effect = self.scheduler.record_error(&spec.id, self.roster.len());
                let removed = self.forget_if_removed(&spec.id);
                if effect.degraded && !removed {
                    tracing::warn!(agent = %spec.name, "Agent degraded after repeated failures");
                    self.emit(ZooEvent::AgentDegraded {
                        agent: spec.name.clone(),
                    });
                }
                if effect.stalled {
                    self.on_stall();
                }
            }
        }
    }

    /// 回合进行中被移除的 Agent 不再保留健康记录；返回是否已被移除
    fn forget_if_removed(&mut self, id: &AgentId) -> bool {
        if self.roster.get(id).is_some() {
            return false;
        }
        self.scheduler.forget(id);
        true
    }

    fn on_stall(&mut self) {
        let passes = self.scheduler.stall().consecutive_passes;
        tracing::info!(passes, "All agents passed, waiting for user input");
        self.emit(ZooEvent::Stalled { passes });
    }

    fn on_write_failure(&mut self, err: &ZooError) {
        tracing::error!(error = %err, "Conversation write failed, pausing");
        if self.recovery.handle(err) == RecoveryAction::PauseAndSurface {
            let _ = self.scheduler.pause();
            self.delay_until = None;
        }
        self.last_error = Some(err.to_string());
        self.emit(ZooEvent::WriteFailed(err.to_string()));
    }

    async fn check_cap(&mut self) {
        let Some(cap) = self.max_messages else {
            return;
        };
        if self.scheduler.state() != RunState::Stopped && self.log.len().await >= cap {
            tracing::info!(cap, "Message cap reached, stopping");
            self.scheduler.stop();
            self.delay_until = None;
            self.emit(ZooEvent::MessageCapReached(cap));
        }
    }

    async fn append_user(&mut self, text: String) -> Result<Message, ZooError> {
        let msg = match self.log.append(Author::User, text).await {
            Ok(msg) => msg,
            Err(e) => {
                self.on_write_failure(&e);
                return Err(e);
            }
        };
        tracing::info!(seq = msg.seq, "User message appended");
        self.scheduler.user_message();
        self.delay_until = None;
        self.emit(ZooEvent::MessageAppended(msg.clone()));
        self.check_cap().await;
        Ok(msg)
    }

    /// 回合期间排队的用户消息，紧跟在该 Agent 的结果之后按到达顺序写入。
    /// 写入失败时该条及其后的消息留在队首，Resume 或下一条用户消息时重试。
    async fn flush_queued_user(&mut self) -> Result<(), ZooError> {
        while let Some(text) = self.queued_user.pop_front() {
            if self.scheduler.state() == RunState::Stopped {
                tracing::warn!(
                    dropped = self.queued_user.len() + 1,
                    "Conversation stopped, dropping queued user messages"
                );
                self.queued_user.clear();
                break;
            }
            if let Err(e) = self.append_user(text.clone()).await {
                self.queued_user.push_front(text);
                tracing::warn!(pending = self.queued_user.len(), "Queued user messages kept for retry");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn handle_request(&mut self, (cmd, reply_tx): Request) {
        tracing::debug!(?cmd, "Command received");
        let result = self.handle_command(cmd).await;
        if let Err(e) = &result {
            if self.recovery.is_fatal(e) {
                tracing::error!(error = %e, "Command failed");
            } else {
                tracing::warn!(error = %e, "Command rejected");
            }
        }
        self.publish().await;
        let _ = reply_tx.send(result);
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<Reply, ZooError> {
        match cmd {
            Command::Pause => {
                if self.scheduler.pause()? {
                    tracing::info!("Paused");
                }
                self.delay_until = None;
                Ok(Reply::Ack)
            }
            Command::Resume => {
                let is_empty = self.log.is_empty().await;
                let state = self.scheduler.resume(is_empty)?;
                tracing::info!(%state, "Resumed");
                if self.turn_holder.is_none() {
                    self.flush_queued_user().await?;
                }
                Ok(Reply::Ack)
            }
            Command::Stop => {
                self.scheduler.stop();
                self.turn_holder = None;
                self.delay_until = None;
                self.queued_user.clear();
                tracing::info!("Stopped");
                Ok(Reply::Ack)
            }
            Command::Restart => {
                self.log.reset().await?;
                self.epoch += 1;
                self.scheduler.restart();
                // 进行中的调用结果将被丢弃，之后的用户消息直接写入
                self.turn_holder = None;
                self.delay_until = None;
                self.queued_user.clear();
                self.last_error = None;
                tracing::info!("Restarted with an empty conversation");
                self.emit(ZooEvent::LogReset);
                Ok(Reply::Ack)
            }
            Command::InjectUserMessage(text) => {
                if text.trim().is_empty() {
                    return Err(ZooError::InvalidCommand("user message is empty".into()));
                }
                if self.scheduler.state() == RunState::Stopped {
                    return Err(ZooError::InvalidCommand(
                        "conversation is stopped, restart first".into(),
                    ));
                }
                if self.turn_holder.is_some() {
                    tracing::debug!("Agent is producing, queueing user message");
                    self.queued_user.push_back(text);
                    return Ok(Reply::Queued);
                }
                // 先写入之前未能落盘的排队消息
                self.flush_queued_user().await?;
                if self.scheduler.state() == RunState::Stopped {
                    return Err(ZooError::InvalidCommand("message cap reached".into()));
                }
                let msg = self.append_user(text).await?;
                Ok(Reply::Appended(msg.seq))
            }
            Command::AddAgent(spec) => {
                let name = spec.name.clone();
                let id = self.roster.add(spec)?;
                tracing::info!(agent = %name, %id, "Agent added");
                self.scheduler.roster_changed(self.roster.len());
                self.persist_settings().await;
                Ok(Reply::AgentAdded(id))
            }
            Command::RemoveAgent(id) => {
                let removed = self.roster.remove(&id)?;
                tracing::info!(agent = %removed.name, %id, "Agent removed");
                self.scheduler.forget(&id);
                self.persist_settings().await;
                Ok(Reply::Ack)
            }
            Command::EditAgent(id, spec) => {
                self.roster.edit(&id, spec)?;
                tracing::info!(%id, "Agent edited");
                self.persist_settings().await;
                Ok(Reply::Ack)
            }
            Command::SetGlobalInstructions(text) => {
                self.global_instructions = text;
                self.persist_settings().await;
                Ok(Reply::Ack)
            }
            Command::SetDelay(secs) => {
                self.delay_secs = clamp_delay(secs);
                tracing::info!(delay_secs = self.delay_secs, "Delay updated");
                self.persist_settings().await;
                Ok(Reply::Ack)
            }
            Command::SetMaxTokens(n) => {
                self.max_tokens = clamp_max_tokens(n);
                tracing::info!(max_tokens = self.max_tokens, "Max tokens updated");
                self.persist_settings().await;
                Ok(Reply::Ack)
            }
            Command::Quit => {
                self.quit = true;
                Ok(Reply::Ack)
            }
        }
    }

    /// 写回失败只记录，不回滚已生效的变更
    async fn persist_settings(&mut self) {
        let Some(store) = &self.settings else {
            return;
        };
        let settings = Settings {
            max_tokens: self.max_tokens,
            delay_seconds: self.delay_secs,
            global_prompt: self.global_instructions.clone(),
            default_reasoning_effort: self.default_reasoning_effort,
            agents: self.roster.snapshot().to_vec(),
        };
        if let Err(e) = store.save_async(settings).await {
            tracing::warn!(error = %e, "Failed to save settings");
            self.last_error = Some(e.to_string());
        }
    }

    fn emit(&self, event: ZooEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn publish(&mut self) {
        let state = self.scheduler.state();
        if state != self.published_state {
            tracing::debug!(from = %self.published_state, to = %state, "State changed");
            self.published_state = state;
            self.emit(ZooEvent::StateChanged(state));
        }

        let recent_messages = self.log.recent(self.status_window).await;
        let message_count = self.log.len().await;
        let total_tokens = self.log.total_tokens().await;
        let agents = self
            .roster
            .snapshot()
            .iter()
            .map(|spec| AgentStatus {
                id: spec.id.clone(),
                name: spec.name.clone(),
                model: spec.model.clone(),
                reasoning_effort: spec.reasoning_effort,
                degraded: self.scheduler.is_degraded(&spec.id),
                consecutive_errors: self.scheduler.consecutive_errors(&spec.id),
            })
            .collect();
        let stall = self.scheduler.stall();

        self.status_tx.send_replace(StatusSnapshot {
            run_state: state,
            turn_holder: self.turn_holder.clone(),
            stall_count: stall.consecutive_passes,
            pending_user_input: stall.pending_user_input,
            message_count,
            recent_messages,
            agents,
            total_tokens,
            delay_secs: self.delay_secs,
            max_tokens: self.max_tokens,
            last_error: self.last_error.clone(),
        });
    }
}
