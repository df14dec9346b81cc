//! 回合过程事件：用于前端展示模型调用、工具调用与结果、压缩和错误

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::llm::FinishReason;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 驱动循环进入第几步
    Step { step: usize },
    /// 正在调用翻译模型
    ModelCall { messages: usize, tools: usize },
    /// 模型返回
    ModelResponse {
        text: String,
        tool_calls: usize,
        finish_reason: Option<FinishReason>,
    },
    ToolCall {
        call_id: String,
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        tool: String,
        output: serde_json::Value,
    },
    /// 活动上下文被压缩
    Compacted { summary_chars: usize },
    /// 轮到用户
    Idle,
    Error { text: String },
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
