//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / 输入输出 schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时统一处理未知工具、软失败与审计日志。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::copilot::CopilotGate;
use crate::core::AgentError;
use crate::llm::ToolSchema;
use crate::memory::{Message, MemoryStore};

/// 工具执行失败
#[derive(Error, Debug)]
pub enum ToolError {
    /// 输入不符合 schema；作为工具输出返回给模型
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 执行失败（文件不存在等）；作为工具输出返回给模型
    #[error("{0}")]
    Failed(String),

    /// 必须中止当前步骤的错误（取消等）
    #[error(transparent)]
    Fatal(#[from] AgentError),
}

/// 一次工具调用可见的运行选项。工具只读对话历史，所有追加由 Turn Engine 完成
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub call_id: &'a str,
    pub cancel: &'a CancellationToken,
    /// 执行前的完整历史快照
    pub history: &'a [Message],
    pub copilot: Option<&'a CopilotGate>,
    pub memory: Option<&'a MemoryStore>,
}

/// 工具 trait：名称、描述（供 LLM 理解）、输入/输出 schema、异步执行（input 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool call 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    fn output_schema(&self) -> Value;

    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 发给模型的完整工具 schema 集合（按名称排序，保证请求稳定）
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                output_schema: tool.output_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
