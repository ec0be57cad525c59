//! 模型能力表
//!
//! 决定系统提示使用 system 还是 developer 角色、是否支持 temperature 与 reasoning_effort。
//! 未登记的模型按名称前缀推断：o1/o3/o4/gpt-5 视为推理模型，其余按 GPT-4 处理。

/// 系统提示所用的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptRole {
    System,
    Developer,
}

impl PromptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::Developer => "developer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub role: PromptRole,
    pub supports_temperature: bool,
    pub supports_reasoning_effort: bool,
}

impl ModelCapabilities {
    const fn standard() -> Self {
        Self {
            role: PromptRole::System,
            supports_temperature: true,
            supports_reasoning_effort: false,
        }
    }

    const fn reasoning(supports_reasoning_effort: bool) -> Self {
        Self {
            role: PromptRole::Developer,
            supports_temperature: false,
            supports_reasoning_effort,
        }
    }

    /// 推理模型需要 max_completion_tokens 而非 max_tokens
    pub fn uses_completion_tokens(&self) -> bool {
        self.role == PromptRole::Developer
    }

    pub fn lookup(model: &str) -> Self {
        match model {
            "gpt-4o" | "gpt-4o-mini" | "gpt-4.1" | "gpt-4.1-mini" | "gpt-4.1-nano"
            | "gpt-4-turbo" | "gpt-3.5-turbo" => Self::standard(),
            "o1-mini" => Self::reasoning(false),
            "o1" | "o3" | "o3-mini" | "o4-mini" => Self::reasoning(true),
            m if m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") => {
                Self::reasoning(true)
            }
            m if m.starts_with("gpt-5") => Self::reasoning(true),
            _ => Self::standard(),
        }
    }
}
