//! 对话持久化
//!
//! 将完整历史写入/从 JSON 文件加载，用于跨进程恢复会话（可选使用）。

use std::path::Path;

use crate::memory::Message;

/// 简单的文件持久化：单文件 JSON，消息按 role + content 片段序列化
#[derive(Debug)]
pub struct ConversationPersistence {
    path: std::path::PathBuf,
}

impl ConversationPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 从 JSON 文件加载对话历史；文件不存在时返回空 Vec
    pub fn load(&self) -> anyhow::Result<Vec<Message>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let messages: Vec<Message> = serde_json::from_str(&data)?;
        Ok(messages)
    }

    /// 将对话历史写入 JSON 文件；父目录不存在时自动创建
    pub fn save(&self, messages: &[Message]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(messages)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AssistantPart, ToolCall, ToolResult};
    use serde_json::json;

    #[test]
    fn test_save_then_load_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationPersistence::new(dir.path().join("s").join("history.json"));
        assert!(store.load().unwrap().is_empty());

        let history = vec![
            Message::user("translate a.md"),
            Message::Assistant(vec![AssistantPart::ToolCall(ToolCall {
                id: "c1".into(),
                name: "read".into(),
                input: json!({"file_path": "a.md"}),
            })]),
            Message::tool_results(vec![ToolResult {
                call_id: "c1".into(),
                tool_name: "read".into(),
                output: json!({"content": "Hello"}),
            }]),
        ];
        store.save(&history).unwrap();
        assert_eq!(store.load().unwrap(), history);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ConversationPersistence::new(&path).load().is_err());
    }
}
