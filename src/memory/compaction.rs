//! Context Compaction：用 compactor 模型把活动上下文压缩为一条摘要
//!
//! 模型输出 `<analysis>…</analysis>`（仅诊断，丢弃）与 `<summary>…</summary>`（保留）；
//! 没有 summary 标签时整段输出即为摘要。完整历史永远不被改写。

use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::core::{cancellable, AgentError};
use crate::llm::LlmClient;
use crate::memory::{Conversation, Message};

pub const SYSTEM_COMPACT: &str =
    "You are a helpful AI assistant tasked with summarizing conversations.";

pub const COMPACT_INSTRUCTION: &str = r#"Summarize the conversation so far in enough detail that the translation work can continue without the original messages.

First reason inside <analysis> tags: walk through the conversation in order and note the user's requests, the files read, the translation units proposed and how the reviewer judged each of them (approved, rejected with reason, or refined), terminology and style decisions, and any errors and how they were resolved.

Then write the summary inside <summary> tags with these sections:
1. Primary request and intent (source files, target language, tone)
2. Terminology and style decisions
3. Review feedback (every rejection reason and refinement, verbatim where short)
4. Progress (which part of each file is already translated)
5. All user messages that are not tool results
6. Pending work and the exact next step

Example layout:
<analysis>
[your reasoning]
</analysis>

<summary>
1. Primary request and intent:
   [details]
...
</summary>"#;

static ANALYSIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<analysis>(.*?)</analysis>").expect("valid analysis regex"));
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<summary>(.*?)</summary>").expect("valid summary regex"));

/// 压缩结果：analysis 仅用于诊断
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub analysis: String,
    pub summary: String,
}

/// 解析 `<analysis>` / `<summary>` 块；缺少 summary 时回退为整段文本
pub fn parse_analysis_summary(text: &str) -> CompactionOutcome {
    let analysis = ANALYSIS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let summary = SUMMARY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.trim().to_string());
    CompactionOutcome { analysis, summary }
}

impl Conversation {
    /// 调用 compactor 生成摘要，并用一条助手摘要消息替换活动上下文。
    /// 对已压缩的上下文再次调用只会重新摘要那一条摘要。
    pub async fn compact(
        &mut self,
        compactor: &dyn LlmClient,
        cancel: &CancellationToken,
    ) -> Result<CompactionOutcome, AgentError> {
        let mut prompt: Vec<Message> = self.active_context().to_vec();
        prompt.push(Message::user(COMPACT_INSTRUCTION));

        let text = cancellable(cancel, async {
            compactor
                .complete(Some(SYSTEM_COMPACT), &prompt)
                .await
                .map_err(AgentError::from)
        })
        .await?;

        let outcome = parse_analysis_summary(&text);
        tracing::info!(
            history = self.len(),
            summary_chars = outcome.summary.chars().count(),
            "context compacted"
        );
        self.replace_active_with_summary(&outcome.summary);
        Ok(outcome)
    }
}
