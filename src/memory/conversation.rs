//! 对话存储：消息模型与只追加日志
//!
//! Message 是按角色区分的标签变体（user / assistant / tool），每种角色只允许自己的内容片段类型，
//! 新增片段类型时所有 match 点都会在编译期报错。
//! Conversation 同时维护完整历史（审计/展示，永不修改）与活动上下文（发给模型；压缩后被替换为一条摘要）。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// 用户消息片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserPart {
    Text {
        text: String,
    },
    Image {
        /// URL 或 data URI
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    File {
        data: String,
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

/// 助手消息片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantPart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    ToolCall(ToolCall),
    Image {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    File {
        data: String,
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

/// 模型发起的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(rename = "toolCallId")]
    pub id: String,
    #[serde(rename = "toolName")]
    pub name: String,
    pub input: serde_json::Value,
}

/// 工具调用的结构化结果，call_id 必须指向此前出现过的 ToolCall.id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    #[serde(rename = "toolCallId")]
    pub call_id: String,
    pub tool_name: String,
    pub output: serde_json::Value,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    User(Vec<UserPart>),
    Assistant(Vec<AssistantPart>),
    Tool(Vec<ToolResult>),
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User(vec![UserPart::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant(vec![AssistantPart::Text { text: text.into() }])
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Message::Tool(results)
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User(_) => Role::User,
            Message::Assistant(_) => Role::Assistant,
            Message::Tool(_) => Role::Tool,
        }
    }

    /// 助手消息中的工具调用（其他角色为空）
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        let parts: &[AssistantPart] = match self {
            Message::Assistant(parts) => parts,
            Message::User(_) | Message::Tool(_) => &[],
        };
        parts.iter().filter_map(|p| match p {
            AssistantPart::ToolCall(call) => Some(call),
            AssistantPart::Text { .. }
            | AssistantPart::Reasoning { .. }
            | AssistantPart::Image { .. }
            | AssistantPart::File { .. } => None,
        })
    }

    pub fn tool_calls_mut(&mut self) -> impl Iterator<Item = &mut ToolCall> {
        let parts: &mut [AssistantPart] = match self {
            Message::Assistant(parts) => parts,
            Message::User(_) | Message::Tool(_) => &mut [],
        };
        parts.iter_mut().filter_map(|p| match p {
            AssistantPart::ToolCall(call) => Some(call),
            AssistantPart::Text { .. }
            | AssistantPart::Reasoning { .. }
            | AssistantPart::Image { .. }
            | AssistantPart::File { .. } => None,
        })
    }

    pub fn tool_result_parts(&self) -> &[ToolResult] {
        match self {
            Message::Tool(results) => results,
            Message::User(_) | Message::Assistant(_) => &[],
        }
    }

    /// 可见文本（不含 reasoning），多个文本片段以换行连接
    pub fn text(&self) -> String {
        let texts: Vec<&str> = match self {
            Message::User(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    UserPart::Text { text } => Some(text.as_str()),
                    UserPart::Image { .. } | UserPart::File { .. } => None,
                })
                .collect(),
            Message::Assistant(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    AssistantPart::Text { text } => Some(text.as_str()),
                    AssistantPart::Reasoning { .. }
                    | AssistantPart::ToolCall(_)
                    | AssistantPart::Image { .. }
                    | AssistantPart::File { .. } => None,
                })
                .collect(),
            Message::Tool(_) => Vec::new(),
        };
        texts.join("\n")
    }
}

/// 未解决的工具调用：按首次出现顺序，同一 id 只出现一次，且历史中不存在对应的 tool-result
pub fn unresolved_tool_calls(messages: &[Message]) -> Vec<ToolCall> {
    let resolved: HashSet<&str> = messages
        .iter()
        .flat_map(|m| m.tool_result_parts())
        .map(|r| r.call_id.as_str())
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending = Vec::new();
    for call in messages.iter().flat_map(|m| m.tool_calls()) {
        if resolved.contains(call.id.as_str()) || !seen.insert(call.id.as_str()) {
            continue;
        }
        pending.push(call.clone());
    }
    pending
}

/// 对话存储：完整历史 + 活动上下文，只通过 append 增长
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    history: Vec<Message>,
    active: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已持久化的历史为种子（活动上下文与历史相同）
    pub fn from_history(messages: Vec<Message>) -> Self {
        Self {
            active: messages.clone(),
            history: messages,
        }
    }

    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) {
        for m in messages {
            self.active.push(m.clone());
            self.history.push(m);
        }
    }

    /// 完整历史（只读）
    pub fn snapshot(&self) -> &[Message] {
        &self.history
    }

    /// 发给模型的工作上下文
    pub fn active_context(&self) -> &[Message] {
        &self.active
    }

    pub fn unresolved_tool_calls(&self) -> Vec<ToolCall> {
        unresolved_tool_calls(&self.history)
    }

    /// 用一条助手摘要替换活动上下文；完整历史不受影响
    pub(crate) fn replace_active_with_summary(&mut self, summary: &str) {
        self.active = vec![Message::assistant(summary.trim())];
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn into_history(self) -> Vec<Message> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> AssistantPart {
        AssistantPart::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            input: json!({}),
        })
    }

    fn result(id: &str, name: &str) -> ToolResult {
        ToolResult {
            call_id: id.into(),
            tool_name: name.into(),
            output: json!({"status": "done"}),
        }
    }

    #[test]
    fn test_unresolved_in_first_seen_order() {
        let msgs = vec![
            Message::user("go"),
            Message::Assistant(vec![call("b", "read"), call("a", "ls"), call("c", "thinking")]),
            Message::tool_results(vec![result("a", "ls")]),
        ];
        let ids: Vec<String> = unresolved_tool_calls(&msgs).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_repeated_call_id_is_not_duplicated() {
        let msgs = vec![
            Message::Assistant(vec![call("x", "read")]),
            Message::Assistant(vec![call("x", "read"), call("y", "ls")]),
        ];
        let ids: Vec<String> = unresolved_tool_calls(&msgs).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_result_anywhere_resolves_repeated_call() {
        let msgs = vec![
            Message::Assistant(vec![call("x", "read")]),
            Message::tool_results(vec![result("x", "read")]),
            Message::Assistant(vec![call("x", "read")]),
        ];
        assert!(unresolved_tool_calls(&msgs).is_empty());
    }

    #[test]
    fn test_summary_replaces_active_only() {
        let mut conv = Conversation::new();
        conv.append(vec![Message::user("hi"), Message::assistant("hello")]);
        let before = conv.snapshot().to_vec();
        conv.replace_active_with_summary("  summary text \n");
        assert_eq!(conv.snapshot(), before.as_slice());
        assert_eq!(conv.active_context(), &[Message::assistant("summary text")]);

        conv.append(vec![Message::user("more")]);
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.active_context().len(), 2);
    }

    #[test]
    fn test_message_serde_shape() {
        let m = Message::Assistant(vec![
            AssistantPart::Text { text: "ok".into() },
            call("id1", "ls"),
        ]);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "tool-call");
        assert_eq!(v["content"][1]["toolCallId"], "id1");
        assert_eq!(v["content"][1]["toolName"], "ls");
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_text_skips_reasoning() {
        let m = Message::Assistant(vec![
            AssistantPart::Reasoning { text: "hmm".into() },
            AssistantPart::Text { text: "answer".into() },
        ]);
        assert_eq!(m.text(), "answer");
    }
}
