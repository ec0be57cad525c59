//! 运行设置持久化（`.settings.json`）
//!
//! 保存名册、全局指令、回合间延迟与 max_tokens；启动时加载，每次变更后写回。
//! 文件不存在时使用默认值；格式错误视为 ConfigError。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::ZooError;
use crate::llm::ReasoningEffort;
use crate::roster::AgentSpec;

pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 4000;
pub const MAX_DELAY_SECS: u64 = 300;

pub fn clamp_max_tokens(n: u32) -> u32 {
    n.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS)
}

pub fn clamp_delay(secs: u64) -> u64 {
    secs.min(MAX_DELAY_SECS)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_tokens: u32,
    pub delay_seconds: u64,
    pub global_prompt: String,
    pub default_reasoning_effort: ReasoningEffort,
    pub agents: Vec<AgentSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            delay_seconds: 0,
            global_prompt: String::new(),
            default_reasoning_effort: ReasoningEffort::Medium,
            agents: Vec::new(),
        }
    }
}

impl Settings {
    /// 将越界的数值拉回合法区间
    pub fn normalized(mut self) -> Self {
        self.max_tokens = clamp_max_tokens(self.max_tokens);
        self.delay_seconds = clamp_delay(self.delay_seconds);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Settings, ZooError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(ZooError::ConfigError(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            ZooError::ConfigError(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(settings.normalized())
    }

    /// 先写临时文件再 rename，避免留下半截 JSON
    pub fn save(&self, settings: &Settings) -> Result<(), ZooError> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| ZooError::WriteFailure(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ZooError::WriteFailure(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| ZooError::WriteFailure(format!("{}: {}", self.path.display(), e)))
    }

    /// 运行期写回：在 spawn_blocking 中执行 `save`
    pub async fn save_async(&self, settings: Settings) -> Result<(), ZooError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save(&settings))
            .await
            .map_err(|e| ZooError::WriteFailure(e.to_string()))?
    }
}
