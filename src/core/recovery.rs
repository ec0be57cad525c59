//! 错误恢复引擎
//!
//! 将 ZooError 映射为 RecoveryAction，供编排循环决定是计为 Pass、拒绝、暂停上报还是终止。

use crate::core::{RecoveryAction, ZooError};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ZooError) -> RecoveryAction {
        match err {
            ZooError::Completion(_) => RecoveryAction::CountAsPass,
            ZooError::InvalidCommand(_) => RecoveryAction::Reject,
            ZooError::WriteFailure(_) => RecoveryAction::PauseAndSurface,
            ZooError::ConfigError(_) | ZooError::Closed => RecoveryAction::Abort,
        }
    }

    /// 是否必须交给顶层（操作者介入）
    pub fn is_fatal(&self, err: &ZooError) -> bool {
        matches!(
            self.handle(err),
            RecoveryAction::PauseAndSurface | RecoveryAction::Abort
        )
    }
}
