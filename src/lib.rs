//! Neu - 人机协同的文档翻译智能体
//!
//! 模块划分：
//! - **agent**: 会话级 Agent 句柄与共享组件装配
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **copilot**: 审核 gate、对齐校验、翻译进度
//! - **core**: 错误分类与运行取消范围
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock）
//! - **memory**: 对话存储、上下文压缩、偏好记忆、历史持久化
//! - **react**: Planner 与 Turn Engine（next 状态机）
//! - **session**: 无状态传输下的会话注册表
//! - **tools**: 工具注册表（ls、read、thinking、translate）与执行器
//! - **web**: HTTP 往返接口（feature = "web"）

pub mod agent;
pub mod config;
pub mod copilot;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;

pub use agent::{create_agent_components, Agent, AgentComponents, RunOutcome};
pub use core::AgentError;
