//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 请求按模型能力表构造：system/developer 角色、max_tokens/max_completion_tokens、reasoning_effort。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::json;

use crate::llm::{CompletionRequest, LlmClient, LlmError, ModelCapabilities};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// 把频道文本包装为发给模型的 user 消息
pub fn conversation_turn(conversation: &str) -> String {
    format!(
        "Here is the conversation so far:\n\n{}\n\nWrite your next message.",
        conversation
    )
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            usage: TokenUsage::default(),
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    /// 按模型能力构造请求体
    pub fn build_request(request: &CompletionRequest) -> Result<CreateChatCompletionRequest, LlmError> {
        let caps = ModelCapabilities::lookup(&request.model);
        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": caps.role.as_str(), "content": request.system_prompt },
                { "role": "user", "content": conversation_turn(&request.conversation) },
            ],
        });

        if caps.uses_completion_tokens() {
            body["max_completion_tokens"] = json!(request.max_tokens);
        } else {
            body["max_tokens"] = json!(request.max_tokens);
        }
        if caps.supports_reasoning_effort {
            if let Some(effort) = request.reasoning_effort {
                body["reasoning_effort"] = json!(effort.as_str());
            }
        }

        serde_json::from_value(body).map_err(|e| LlmError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = Self::build_request(&request)?;
        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}
