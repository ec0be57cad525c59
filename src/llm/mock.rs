//! Mock LLM 客户端（离线演示与测试用，无需 API）
//!
//! - `MockLlmClient`：根据会话内容生成确定性回复，上一条用户消息之后的回复够数即 `[PASS]`
//! - `ScriptedLlmClient`：按队列依次返回预设结果，可附加固定延迟

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::PASS_TOKEN;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::memory::{parse_channel, USER_AUTHOR};

/// 离线客户端：上一条用户消息之后已有 `replies_before_pass` 条回复时 Pass
#[derive(Debug)]
pub struct MockLlmClient {
    replies_before_pass: usize,
}

impl MockLlmClient {
    pub fn new(replies_before_pass: usize) -> Self {
        Self { replies_before_pass }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(6)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let messages = parse_channel(&request.conversation);
        let since_user = messages
            .iter()
            .rev()
            .take_while(|m| m.author != USER_AUTHOR)
            .count();
        if since_user >= self.replies_before_pass {
            return Ok(PASS_TOKEN.to_string());
        }
        let seen = messages.len();
        Ok(format!(
            "(mock {}) I have read {} message(s) so far.",
            request.model, seen
        ))
    }
}

/// 按脚本返回结果；脚本耗尽后返回 `[PASS]`
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    latency: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(PASS_TOKEN.to_string()))
    }
}
