//! LLM 客户端抽象
//!
//! Turn Engine 只依赖这个契约：给定 system prompt、消息与工具 schema，生成若干条消息（文本和/或工具调用）
//! 以及结束原因。取消由调用方通过丢弃 future 实现（见 core::cancellable）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{AssistantPart, Message, ToolCall};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    Api(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// 脚本化客户端已无可用回复（测试）
    #[error("no scripted response left")]
    Exhausted,
}

/// 暴露给模型的工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
}

/// 一次生成请求
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSchema],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Error,
    Other,
}

impl FinishReason {
    /// 将 OpenAI 兼容接口的 finish_reason 字符串映射为枚举
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" => FinishReason::Stop,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            _ => FinishReason::Other,
        }
    }
}

/// 生成结果：模型产出的消息（通常为一条助手消息）与结束原因
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub messages: Vec<Message>,
    pub finish_reason: Option<FinishReason>,
}

impl Generation {
    /// 仅含文本的一条助手回复
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(text)],
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// 带工具调用的一条助手回复；id 由 Turn Engine 重新分配
    pub fn with_tool_calls(text: Option<&str>, calls: Vec<(&str, serde_json::Value)>) -> Self {
        let mut parts = Vec::new();
        if let Some(t) = text {
            parts.push(AssistantPart::Text { text: t.to_string() });
        }
        for (i, (name, input)) in calls.into_iter().enumerate() {
            parts.push(AssistantPart::ToolCall(ToolCall {
                id: format!("provider-{i}"),
                name: name.to_string(),
                input,
            }));
        }
        Self {
            messages: vec![Message::Assistant(parts)],
            finish_reason: Some(FinishReason::ToolCalls),
        }
    }

    /// 空回复（模型什么都没返回）
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.messages.iter().any(|m| m.tool_calls().next().is_some())
    }

    /// 所有消息的可见文本
    pub fn text_content(&self) -> String {
        self.messages
            .iter()
            .map(Message::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 带工具的生成
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation, LlmError>;

    /// 无工具的纯文本完成（压缩、记忆提炼使用）
    async fn complete(&self, system: Option<&str>, messages: &[Message]) -> Result<String, LlmError> {
        let generation = self
            .generate(GenerateRequest {
                system,
                messages,
                tools: &[],
            })
            .await?;
        Ok(generation.text_content())
    }

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
