//! 工具执行器
//!
//! 持有 ToolRegistry，execute(call, ctx) 按名分发：未注册的工具返回 AgentError::UnknownTool（中止当前步骤），
//! 输入错误与执行失败转为 `{"error": ...}` 输出交还模型，Fatal 原样上抛；每次调用输出结构化审计日志（JSON）。
//! 不设超时：translate 等待人工审核的时间不受限，只响应取消。

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::core::AgentError;
use crate::memory::{ToolCall, ToolResult};
use crate::tools::{ToolContext, ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 所有调用的工具都已注册；否则返回第一个未知工具名
    pub fn ensure_known(&self, calls: &[ToolCall]) -> Result<(), AgentError> {
        match calls.iter().find(|c| !self.registry.contains(&c.name)) {
            Some(call) => Err(AgentError::UnknownTool(call.name.clone())),
            None => Ok(()),
        }
    }

    /// 执行一次工具调用并构造 tool-result；输出 JSON 审计日志
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> Result<ToolResult, AgentError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        let start = Instant::now();
        let result = tool.execute(call.input.clone(), ctx).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::InvalidInput(_)) => "invalid_input",
            Err(ToolError::Failed(_)) => "error",
            Err(ToolError::Fatal(e)) if e.is_cancelled() => "cancelled",
            Err(ToolError::Fatal(_)) => "fatal",
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.input),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let output = match result {
            Ok(output) => output,
            Err(ToolError::Fatal(e)) => return Err(e),
            Err(e @ (ToolError::InvalidInput(_) | ToolError::Failed(_))) => {
                json!({ "error": e.to_string() })
            }
        };
        Ok(ToolResult {
            call_id: call.id.clone(),
            tool_name: tool.name().to_string(),
            output,
        })
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
