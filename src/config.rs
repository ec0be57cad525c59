//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ZOO__*` 覆盖（双下划线表示嵌套，如 `ZOO__LLM__PROVIDER=mock`）。
//! 另有 params 文件（params.toml）：初始用户消息、channel 路径与 agent1、agent2 ... 表。

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::llm::ReasoningEffort;
use crate::roster::AgentSpec;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub run: RunSection,
    pub llm: LlmSection,
}

/// [run] 段：日志与设置文件位置、回合节奏、停止条件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub channel_path: PathBuf,
    pub settings_path: PathBuf,
    /// 未设置时沿用 settings 文件中的值
    pub delay_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub max_messages: Option<usize>,
    pub first_agent: Option<String>,
    /// 单次补全超时（秒）
    pub completion_timeout_secs: u64,
    pub status_window: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            channel_path: PathBuf::from("channel.txt"),
            settings_path: PathBuf::from(".settings.json"),
            delay_secs: None,
            max_tokens: None,
            max_messages: None,
            first_agent: None,
            completion_timeout_secs: 120,
            status_window: 20,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 且无 OPENAI_API_KEY 时退回 mock
    pub provider: String,
    pub base_url: Option<String>,
    pub default_model: String,
    pub default_reasoning_effort: Option<ReasoningEffort>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            default_model: "gpt-4o".to_string(),
            default_reasoning_effort: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 ZOO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（必须存在，可覆盖前面的键）
/// 3. 最后叠加环境变量 ZOO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ZOO")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// params 文件内容
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub message: Option<String>,
    pub channel: Option<PathBuf>,
    pub agents: Vec<AgentSpec>,
}

#[derive(Debug, Deserialize)]
struct ParamsAgent {
    name: String,
    #[serde(default)]
    prompt: String,
    model: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
}

/// agent1、agent2 ... 依次读取，遇到第一个缺号即停止；未指定 model 的使用 `default_model`
pub fn parse_params(raw: &str, default_model: &str) -> anyhow::Result<Params> {
    let table: toml::Table = raw.parse().context("params file is not valid TOML")?;

    let message = table
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let channel = table
        .get("channel")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);

    let mut agents = Vec::new();
    for i in 1.. {
        let key = format!("agent{}", i);
        let Some(value) = table.get(&key) else {
            break;
        };
        let entry: ParamsAgent = value
            .clone()
            .try_into()
            .with_context(|| format!("invalid [{}] table", key))?;
        let mut spec = AgentSpec::new(entry.name, entry.prompt)
            .with_model(entry.model.unwrap_or_else(|| default_model.to_string()));
        if let Some(effort) = entry.reasoning_effort {
            spec = spec.with_reasoning_effort(effort);
        }
        agents.push(spec);
    }

    Ok(Params {
        message,
        channel,
        agents,
    })
}

pub fn load_params(path: &Path, default_model: &str) -> anyhow::Result<Params> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read params file {}", path.display()))?;
    parse_params(&raw, default_model).with_context(|| format!("in {}", path.display()))
}
