//! Translate 工具：需要人工审核的翻译单元
//!
//! 流程：超长源文直接 reject（不经过审核者）→ 未配置 Copilot Gate 时自动 approve →
//! 对齐校验（找不到 / 不唯一 / 未读文件时合成 reject）→ 交给 gate 等待裁决。
//! 非 approve 的裁决在返回工具结果之前先完成偏好记忆提炼；提炼失败只记日志。

use async_trait::async_trait;
use serde_json::Value;

use crate::copilot::{
    validate, AlignmentError, CopilotRequest, CopilotResponse, TranslationState,
};
use crate::core::AgentError;
use crate::tools::schema::{parse_input, schema_value, to_output};
use crate::tools::{Tool, ToolContext, ToolError};

/// 单个翻译单元源文的最大字符数
pub const MAX_SOURCE_CHARS: usize = 300;

const DESCRIPTION: &str = r#"Create translation units for documents to be translated. According to the current context's requirements, select a limited amount of text each time for translation. During translation, follow the user's requirements including target language, tone, and terminology.

- Before translating a specific file, ensure the 'read' tool has been used in the current context to read the file with the corresponding ID so you have the latest file contents.
- The 'src_string' must be unique in the original text; if it's not unique the translation will fail. You can ensure uniqueness by expanding the 'src_string' range.
- 'src_string' must not exceed 300 characters.
- 'src_string' should contain only the current unit's content and must not include content from previously translated units.
- 'translate_string' is the draft translation of 'src_string' but should be as accurate as possible to reduce later manual proofreading.
- The returned 'translated_string' is the final translation after human review. 'status' indicates the human review state and can be 'approve', 'reject', or 'refined' (user manually adjusted).
- If 'reject' is due to 'src_string' not existing in the original text, verify the selected unit and ensure spacing and line breaks match.
- If 'reject' is due to 'src_string' being non-unique, gradually increase its scope until you find a unique match."#;

pub struct TranslateTool;

#[async_trait]
impl Tool for TranslateTool {
    fn name(&self) -> &str {
        "translate"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn input_schema(&self) -> Value {
        schema_value::<CopilotRequest>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<CopilotResponse>()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let request: CopilotRequest = parse_input(input)?;
        let response = review(&request, ctx).await?;
        to_output(&response)
    }
}

/// 得到一个翻译单元的最终裁决
pub async fn review(request: &CopilotRequest, ctx: &ToolContext<'_>) -> Result<CopilotResponse, AgentError> {
    if request.src_string.chars().count() > MAX_SOURCE_CHARS {
        return Ok(CopilotResponse::reject(format!(
            "Source string exceeds maximum length of {MAX_SOURCE_CHARS} characters"
        )));
    }

    let Some(gate) = ctx.copilot else {
        return Ok(CopilotResponse::approve(request.translate_string.clone()));
    };

    let state = TranslationState::from_history(ctx.history, &request.file_id);
    let validation = match state.document.as_deref() {
        Some(document) => validate(document, &state.accepted_source(), &request.src_string),
        None => Err(AlignmentError::NoDocument),
    };

    let response = match validation {
        Err(invalid) => {
            tracing::debug!(call_id = %ctx.call_id, reason = %invalid, "translate unit rejected by alignment");
            CopilotResponse::reject(invalid.to_string())
        }
        Ok(view) => {
            if view.has_gap() {
                let gap_chars = view.gap.chars().count();
                tracing::debug!(call_id = %ctx.call_id, gap_chars, "translate unit skips source text");
            }
            let mut verdict = gate
                .request(ctx.call_id, request.clone(), view, ctx.cancel)
                .await?;
            if verdict.is_approve() {
                verdict.translated_string = request.translate_string.clone();
                verdict.reason.clear();
            }
            verdict
        }
    };

    if !response.is_approve() {
        if let Some(memory) = ctx.memory {
            match memory.extract(request, &response, ctx.cancel).await {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => tracing::warn!(call_id = %ctx.call_id, error = %e, "memory extraction failed"),
            }
        }
    }
    Ok(response)
}
