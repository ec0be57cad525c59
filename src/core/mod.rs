//! 核心编排层：错误与恢复、状态投影、回合调度、控制通道、主控循环

pub mod control;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;
pub mod state;

pub use control::{Command, ControlHandle, Reply};
pub use error::{RecoveryAction, ZooError};
pub use events::ZooEvent;
pub use orchestrator::{spawn_orchestrator, RunOptions};
pub use recovery::RecoveryEngine;
pub use scheduler::{StallState, TurnEffect, TurnScheduler, DEGRADED_AFTER};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{AgentStatus, RunState, StatusSnapshot};
