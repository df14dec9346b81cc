//! Agent 错误类型
//!
//! 分类：未知工具（当前步致命）、取消（驱动循环静默吞掉）、模型/提供方失败（记录后交还用户）、
//! 会话不存在（无状态传输）、Copilot 审阅表的重复/缺失解析。校验类错误（找不到 / 不唯一 / 超长）
//! 不在此列，它们在 translate 执行器内被转换为合成的 reject 结论。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型请求了未注册的工具；当前步失败，不重试
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Session \"{0}\" not found")]
    SessionNotFound(String),

    /// resolve 的 call id 不在待审表中
    #[error("No pending review for tool call {0}")]
    ReviewNotPending(String),

    /// 同一 call id 已有挂起的审核
    #[error("Review for tool call {0} is already pending")]
    ReviewAlreadyPending(String),

    #[error("Review for tool call {0} was already resolved")]
    ReviewAlreadyResolved(String),

    /// 无状态往返携带了 copilot 结论，但会话没有等待中的审阅
    #[error("Session has no review awaiting a copilot response")]
    NoPendingReview,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
