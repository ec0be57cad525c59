//! Zoo - 多智能体轮流对话中继
//!
//! 模块划分：
//! - **agent**: 回合应答者（LLM Agent）与 Pass 协议
//! - **config**: 应用配置加载（TOML + 环境变量）与 params 文件
//! - **console**: 行式控制台（stdin 命令 / 用户消息，事件输出）
//! - **core**: 回合调度、控制通道、主控循环、错误与恢复、优雅关闭
//! - **llm**: 补全服务抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 追加式会话日志、频道文件格式与持久化
//! - **roster**: Agent 定义与名册
//! - **settings**: `.settings.json` 运行设置

pub mod agent;
pub mod config;
pub mod console;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod roster;
pub mod settings;

pub use crate::core::{spawn_orchestrator, Command, ControlHandle, Reply, RunOptions, RunState};
