//! 文档查看工具：ls / read
//!
//! 基于 DocumentSet 沙箱；找不到、不可读等错误以 `{"error": ...}` 输出返回模型，不中止循环。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::schema::{parse_input, schema_value, to_output};
use crate::tools::{DocumentEntry, DocumentSet, Tool, ToolContext, ToolError};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LsInput {
    /// Directory to list, relative to the document root ('.' for the root)
    #[serde(default = "default_ls_path")]
    pub path: String,
    /// Glob patterns to ignore, matched against entry names and paths
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
}

fn default_ls_path() -> String {
    ".".to_string()
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct LsOutput {
    pub entries: Vec<DocumentEntry>,
}

/// Ls 工具：列出目录
pub struct LsTool {
    docs: DocumentSet,
}

impl LsTool {
    pub fn new(docs: DocumentSet) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "Lists files and directories in the document set. Paths are relative to the document root. You can optionally provide glob patterns to ignore with the ignore parameter."
    }

    fn input_schema(&self) -> Value {
        schema_value::<LsInput>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<LsOutput>()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let input: LsInput = parse_input(input)?;
        tracing::debug!(path = %input.path, "ls tool execute");
        let ignore = input.ignore.unwrap_or_default();
        let entries = self.docs.list(&input.path, &ignore).await?;
        to_output(&LsOutput { entries })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadInput {
    /// Path of the file to read, as returned by ls
    pub file_path: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReadOutput {
    pub content: String,
}

/// Read 工具：读取文件全文
pub struct ReadTool {
    docs: DocumentSet,
}

impl ReadTool {
    pub fn new(docs: DocumentSet) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a whole file from the document set. Use the file path as the file_id when translating that file. It is okay to read a file that does not exist; an error will be returned. You can call multiple tools in a single response, so read several files as a batch when they are potentially useful."
    }

    fn input_schema(&self) -> Value {
        schema_value::<ReadInput>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<ReadOutput>()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let input: ReadInput = parse_input(input)?;
        tracing::debug!(file_path = %input.file_path, "read tool execute");
        let content = self.docs.read(&input.file_path).await?;
        to_output(&ReadOutput { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_ls_and_read_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Hello").unwrap();
        let docs = DocumentSet::new(dir.path());
        let cancel = CancellationToken::new();
        let ctx = ToolContext {
            call_id: "c",
            cancel: &cancel,
            history: &[],
            copilot: None,
            memory: None,
        };

        let ls = LsTool::new(docs.clone()).execute(json!({}), &ctx).await.unwrap();
        assert_eq!(ls, json!({"entries": [{"name": "a.md", "type": "file", "path": "a.md"}]}));

        let read = ReadTool::new(docs.clone())
            .execute(json!({"file_path": "a.md"}), &ctx)
            .await
            .unwrap();
        assert_eq!(read, json!({"content": "Hello"}));

        let missing = ReadTool::new(docs).execute(json!({"file_path": "b.md"}), &ctx).await;
        assert!(matches!(missing, Err(ToolError::Failed(_))));
    }

    #[test]
    fn test_read_schema_requires_file_path() {
        let schema = ReadTool::new(DocumentSet::new(".")).input_schema();
        assert_eq!(schema["required"], json!(["file_path"]));
    }
}
