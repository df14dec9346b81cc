//! Planner：拼装 system prompt 调用翻译模型，并为每个工具调用分配全局唯一 id
//!
//! 偏好记忆原样插入 system prompt；模型给出的 tool-call id 一律替换为高精度时间戳 + 随机后缀。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{cancellable, AgentError};
use crate::llm::{GenerateRequest, Generation, LlmClient, ToolSchema};
use crate::memory::Message;

/// 翻译工作流 system prompt，`memory` 为当前偏好记忆全文
pub fn workflow_prompt(memory: &str) -> String {
    format!(
        r#"You are a professional document translator working together with a human reviewer.

<workflow>
1. Find out which files the user wants translated and into which language, tone and terminology. Ask when the request is unclear.
2. Use the ls tool to locate files and the read tool to load the full source before translating a file. Use the file path you read as the file_id.
3. Use the thinking tool to plan how to split the document into small translation units.
4. Translate the document in order, one unit at a time, with the translate tool. Each unit continues exactly where the previously accepted unit ended; do not skip text.
5. Every unit is reviewed by the human. Respect the returned status:
   - approve: move on to the next unit.
   - refined: the human edited your draft; learn from the edit and move on.
   - reject: read the reason and propose the same unit again, fixed.
6. When the whole document is translated, tell the user and stop calling tools.
</workflow>

<user_preferences>
{memory}
</user_preferences>

Always follow the user preferences above. They were learned from earlier reviews and take priority over your own style choices."#
    )
}

/// 生成全局唯一的 tool-call id：纳秒时间戳 + 随机后缀
pub fn new_call_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("call_{:x}_{}", nanos, &suffix[..8])
}

/// 为所有助手消息中的工具调用重新分配 id
pub fn assign_call_ids(messages: &mut [Message]) {
    for message in messages.iter_mut() {
        for call in message.tool_calls_mut() {
            call.id = new_call_id();
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 调用翻译模型；取消时丢弃进行中的请求
    pub async fn plan(
        &self,
        memory: &str,
        context: &[Message],
        tools: &[ToolSchema],
        cancel: &CancellationToken,
    ) -> Result<Generation, AgentError> {
        let system = workflow_prompt(memory);
        let mut generation = cancellable(cancel, async {
            self.llm
                .generate(GenerateRequest {
                    system: Some(&system),
                    messages: context,
                    tools,
                })
                .await
                .map_err(AgentError::from)
        })
        .await?;
        assign_call_ids(&mut generation.messages);
        Ok(generation)
    }
}
