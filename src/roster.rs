//! Agent 名册：id → AgentSpec 映射加显式轮转顺序
//!
//! 名册随时可增删改；调度器每回合通过 `snapshot()` 取一份不可变副本（写时复制），
//! 并发编辑不会影响进行中的回合。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::ZooError;
use crate::llm::ReasoningEffort;
use crate::memory::USER_AUTHOR;

/// 稳定的 Agent 唯一标识
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

/// 单个 Agent 的配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default = "AgentId::generate")]
    pub id: AgentId,
    pub name: String,
    /// 系统提示词
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: AgentId::generate(),
            name: name.into(),
            prompt: prompt.into(),
            model: default_model(),
            reasoning_effort: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    fn validate(&self) -> Result<(), ZooError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ZooError::InvalidCommand("agent name must not be empty".into()));
        }
        if name.eq_ignore_ascii_case(USER_AUTHOR) {
            return Err(ZooError::InvalidCommand(format!(
                "agent name '{}' is reserved",
                USER_AUTHOR
            )));
        }
        if self.id.as_str().trim().is_empty() {
            return Err(ZooError::InvalidCommand("agent id must not be empty".into()));
        }
        Ok(())
    }
}

/// 名册：轮转顺序 + 映射，并缓存最新快照
#[derive(Debug, Clone, Default)]
pub struct Roster {
    order: Vec<AgentId>,
    agents: HashMap<AgentId, AgentSpec>,
    snapshot: Arc<Vec<AgentSpec>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由初始名单构建；重复 id 或非法名称视为配置错误
    pub fn from_specs(specs: Vec<AgentSpec>) -> Result<Self, ZooError> {
        let mut roster = Self::new();
        for spec in specs {
            roster
                .add(spec)
                .map_err(|e| ZooError::ConfigError(e.to_string()))?;
        }
        Ok(roster)
    }

    pub fn add(&mut self, spec: AgentSpec) -> Result<AgentId, ZooError> {
        spec.validate()?;
        if self.agents.contains_key(&spec.id) {
            return Err(ZooError::InvalidCommand(format!(
                "agent id '{}' already exists",
                spec.id
            )));
        }
        let id = spec.id.clone();
        self.order.push(id.clone());
        self.agents.insert(id.clone(), spec);
        self.rebuild();
        Ok(id)
    }

    pub fn remove(&mut self, id: &AgentId) -> Result<AgentSpec, ZooError> {
        let spec = self
            .agents
            .remove(id)
            .ok_or_else(|| ZooError::InvalidCommand(format!("unknown agent id '{}'", id)))?;
        self.order.retain(|x| x != id);
        self.rebuild();
        Ok(spec)
    }

    /// 替换 Agent 配置；id 保持不变（忽略新配置中的 id）
    pub fn edit(&mut self, id: &AgentId, mut spec: AgentSpec) -> Result<(), ZooError> {
        if !self.agents.contains_key(id) {
            return Err(ZooError::InvalidCommand(format!("unknown agent id '{}'", id)));
        }
        spec.id = id.clone();
        spec.validate()?;
        self.agents.insert(id.clone(), spec);
        self.rebuild();
        Ok(())
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentSpec> {
        self.agents.get(id)
    }

    /// 按 id 或显示名（不区分大小写）查找
    pub fn find(&self, key: &str) -> Option<&AgentSpec> {
        self.agents.get(&AgentId::from(key)).or_else(|| {
            self.snapshot
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(key))
        })
    }

    /// 当前轮转顺序下的不可变快照
    pub fn snapshot(&self) -> Arc<Vec<AgentSpec>> {
        Arc::clone(&self.snapshot)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn rebuild(&mut self) {
        let specs = self
            .order
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect();
        self.snapshot = Arc::new(specs);
    }
}
