//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：补全错误与非法命令在本地恢复，写入失败与配置错误上抛给操作者。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZooError {
    /// 日志追加未能落盘（该次追加作废，循环暂停）
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// 模型调用失败或超时（按 Pass 计数）
    #[error("Completion error: {0}")]
    Completion(#[from] LlmError),

    /// 非法控制命令（拒绝，状态不变）
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// 初始名册 / 设置格式错误（仅启动时致命）
    #[error("Config error: {0}")]
    ConfigError(String),

    /// 编排循环已退出
    #[error("Orchestrator is not running")]
    Closed,
}

/// 恢复引擎根据错误类型给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 记为一次 Pass 并推进回合
    CountAsPass,
    /// 拒绝命令并报告调用方
    Reject,
    /// 暂停循环并向上报告，等待操作者处理
    PauseAndSurface,
    /// 终止（启动阶段）
    Abort,
}
