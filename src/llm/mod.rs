//! LLM 层：补全服务抽象、模型能力表与实现（OpenAI 兼容 / Mock / Scripted）

pub mod capabilities;
pub mod mock;
pub mod openai;
pub mod traits;

pub use capabilities::{ModelCapabilities, PromptRole};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{CompletionRequest, LlmClient, LlmError, ReasoningEffort};
