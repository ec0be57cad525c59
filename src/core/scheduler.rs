//! 回合调度器：核心状态机
//!
//! 持有 RunState、轮转游标、连续 Pass 计数与各 Agent 健康度；不做任何 I/O，
//! 由编排循环在回合边界驱动。轮转基于每回合开始时的名册快照：
//! 轮到的 Agent 若已被移除则跳过（不计入停滞），名册为空时转入 AwaitingUser。

use std::collections::HashMap;

use crate::core::{RunState, ZooError};
use crate::roster::{AgentId, AgentSpec};

/// 同一 Agent 连续错误达到该次数即标记为 degraded
pub const DEGRADED_AFTER: u32 = 3;

/// 停滞状态：连续 Pass（或错误）计数；达到名册大小时置 pending_user_input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StallState {
    pub consecutive_passes: usize,
    pub pending_user_input: bool,
}

#[derive(Debug, Clone, Default)]
struct AgentHealth {
    consecutive_errors: u32,
    degraded: bool,
}

/// 轮转游标：上一次选择时的顺序，以及下一位在其中的下标
#[derive(Debug, Clone, Default)]
struct TurnCursor {
    order: Vec<AgentId>,
    next: usize,
}

/// 一次回合结果带来的变化
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnEffect {
    /// 本次结果使连续 Pass 达到名册大小
    pub stalled: bool,
    /// 本次结果使该 Agent 刚被标记为 degraded
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct TurnScheduler {
    state: RunState,
    stall: StallState,
    cursor: TurnCursor,
    first: Option<AgentId>,
    health: HashMap<AgentId, AgentHealth>,
}

impl TurnScheduler {
    /// `first`：首个发言的 Agent；为空时从名册第一位开始
    pub fn new(first: Option<AgentId>) -> Self {
        Self {
            state: RunState::Idle,
            stall: StallState::default(),
            cursor: Self::initial_cursor(&first),
            first,
            health: HashMap::new(),
        }
    }

    fn initial_cursor(first: &Option<AgentId>) -> TurnCursor {
        TurnCursor {
            order: first.iter().cloned().collect(),
            next: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stall(&self) -> &StallState {
        &self.stall
    }

    pub fn can_take_turn(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_degraded(&self, id: &AgentId) -> bool {
        self.health.get(id).map_or(false, |h| h.degraded)
    }

    pub fn consecutive_errors(&self, id: &AgentId) -> u32 {
        self.health.get(id).map_or(0, |h| h.consecutive_errors)
    }

    /// 选出下一位发言者，并把游标移到其后一位
    pub fn select_next(&mut self, roster: &[AgentSpec]) -> Option<AgentSpec> {
        if roster.is_empty() {
            return None;
        }

        let order = &self.cursor.order;
        let n = order.len();
        let due = (0..n)
            .map(|k| &order[(self.cursor.next + k) % n])
            .find(|id| roster.iter().any(|s| &s.id == *id));
        let pos = due
            .and_then(|id| roster.iter().position(|s| &s.id == id))
            .unwrap_or(0);

        let chosen = roster[pos].clone();
        self.cursor.order = roster.iter().map(|s| s.id.clone()).collect();
        self.cursor.next = (pos + 1) % roster.len();
        Some(chosen)
    }

    /// Agent 产出消息：停滞计数清零，健康度恢复
    pub fn record_message(&mut self, agent: &AgentId) {
        self.stall = StallState::default();
        self.health.insert(agent.clone(), AgentHealth::default());
    }

    pub fn record_pass(&mut self, agent: &AgentId, roster_len: usize) -> TurnEffect {
        self.health.insert(agent.clone(), AgentHealth::default());
        TurnEffect {
            stalled: self.bump_stall(roster_len),
            degraded: false,
        }
    }

    /// 错误按 Pass 计入停滞；连续 DEGRADED_AFTER 次后标记 degraded（不移除）
    pub fn record_error(&mut self, agent: &AgentId, roster_len: usize) -> TurnEffect {
        let health = self.health.entry(agent.clone()).or_default();
        health.consecutive_errors += 1;
        let degraded = if health.consecutive_errors >= DEGRADED_AFTER && !health.degraded {
            health.degraded = true;
            true
        } else {
            false
        };
        TurnEffect {
            stalled: self.bump_stall(roster_len),
            degraded,
        }
    }

    fn bump_stall(&mut self, roster_len: usize) -> bool {
        self.stall.consecutive_passes += 1;
        if roster_len == 0
            || self.stall.pending_user_input
            || self.stall.consecutive_passes < roster_len
        {
            return false;
        }
        self.stall.pending_user_input = true;
        if self.state == RunState::Running {
            self.state = RunState::AwaitingUser;
        }
        true
    }

    /// 用户消息写入：停滞清零；Idle / AwaitingUser 转入 Running，Paused 保持
    pub fn user_message(&mut self) {
        self.stall = StallState::default();
        if matches!(self.state, RunState::Idle | RunState::AwaitingUser) {
            self.state = RunState::Running;
        }
    }

    /// 名册为空，无人可选
    pub fn await_user(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::AwaitingUser;
        }
    }

    /// 名册变更后：若只是因名册为空而等待，则恢复运行
    pub fn roster_changed(&mut self, roster_len: usize) -> bool {
        if self.state == RunState::AwaitingUser && !self.stall.pending_user_input && roster_len > 0 {
            self.state = RunState::Running;
            return true;
        }
        false
    }

    pub fn pause(&mut self) -> Result<bool, ZooError> {
        match self.state {
            RunState::Stopped => Err(ZooError::InvalidCommand(
                "cannot pause a stopped conversation".into(),
            )),
            RunState::Paused => Ok(false),
            _ => {
                self.state = RunState::Paused;
                Ok(true)
            }
        }
    }

    /// 恢复：日志为空回到 Idle，停滞未解除回到 AwaitingUser，否则 Running
    pub fn resume(&mut self, log_is_empty: bool) -> Result<RunState, ZooError> {
        if self.state != RunState::Paused {
            return Err(ZooError::InvalidCommand(format!(
                "cannot resume while {}",
                self.state
            )));
        }
        self.state = if log_is_empty {
            RunState::Idle
        } else if self.stall.pending_user_input {
            RunState::AwaitingUser
        } else {
            RunState::Running
        };
        Ok(self.state)
    }

    pub fn stop(&mut self) {
        self.state = RunState::Stopped;
    }

    /// 回到 Idle：清空停滞与健康度，游标回到首位发言者
    pub fn restart(&mut self) {
        self.state = RunState::Idle;
        self.stall = StallState::default();
        self.cursor = Self::initial_cursor(&self.first);
        self.health.clear();
    }

    pub fn forget(&mut self, agent: &AgentId) {
        self.health.remove(agent);
    }
}
