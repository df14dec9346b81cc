//! 偏好记忆（Memory Store）
//!
//! 单个只增长的文本块，每条笔记一行。每次非 approve 裁决后用 memory 模型提炼一条 10–30 字的偏好，
//! 追加到内存中的文本块，并把完整文本整体覆盖写回持久化后端。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::copilot::{CopilotRequest, CopilotResponse, CopilotStatus};
use crate::core::{cancellable, AgentError};
use crate::llm::LlmClient;
use crate::memory::Message;

/// 记忆的持久化契约：整块读取、整块覆盖
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// 不存在时返回 None（不是错误）
    async fn load(&self) -> std::io::Result<Option<String>>;
    async fn save(&self, content: &str) -> std::io::Result<()>;
}

/// 单文件后端（默认 ./memory.txt）
#[derive(Debug, Clone)]
pub struct FileMemoryBackend {
    path: PathBuf,
}

impl FileMemoryBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MemoryBackend for FileMemoryBackend {
    async fn load(&self) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, content: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await
    }
}

/// 进程内后端（测试 / 无持久化场景）
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    content: std::sync::Mutex<Option<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: std::sync::Mutex::new(Some(content.into())),
        }
    }

    /// 最近一次写入的内容
    pub fn persisted(&self) -> Option<String> {
        self.content
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.persisted())
    }

    async fn save(&self, content: &str) -> std::io::Result<()> {
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.to_string());
        Ok(())
    }
}

/// 构造偏好提炼 prompt：反馈（改写前后或拒绝原因）+ 已有偏好 + 输出要求
pub fn memory_prompt(req: &CopilotRequest, res: &CopilotResponse, current: &str) -> String {
    let feedback = match res.status {
        CopilotStatus::Refined => format!(
            "The user adjusted the draft for this unit. The original draft was:\n<from>\n{}\n</from>\nThe user's adjusted result is:\n<to>\n{}\n</to>",
            req.translate_string, res.translated_string
        ),
        CopilotStatus::Reject => {
            format!("The user rejected the draft. Reason: {}", res.reason)
        }
        CopilotStatus::Approve => String::new(),
    };

    format!(
        r#"You are a user-preference management system that extracts a user's preferences from their feedback on translation drafts. The source text of this unit was:
<source>
{src}
</source>

The following is the user's feedback:
<feedback>
{feedback}
</feedback>

Previously recorded user preferences:
<profile>
{current}
</profile>

<response_format>
Analyze the feedback above and reply with only a short (10-30 characters) note summarizing the preference it expresses.
It can be a specific fact or a reasonable inference.
If the recorded preferences already contain a related item, restate it with more emphasis.

<example>
Use phrasing A
</example>

<example>
Keep a concise style
</example>

<example>
Always translate term A as B
</example>
</response_format>"#,
        src = req.src_string,
    )
}

/// 偏好记忆：内存中的文本块 + 持久化后端 + 提炼模型
pub struct MemoryStore {
    current: RwLock<String>,
    backend: Arc<dyn MemoryBackend>,
    model: Arc<dyn LlmClient>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn MemoryBackend>, model: Arc<dyn LlmClient>) -> Self {
        Self {
            current: RwLock::new(String::new()),
            backend,
            model,
        }
    }

    /// 启动时加载持久化内容；不存在视为空记忆
    pub async fn init(&self) -> Result<(), AgentError> {
        let loaded = self.backend.load().await?.unwrap_or_default();
        tracing::debug!(chars = loaded.chars().count(), "memory loaded");
        *self.current.write().await = loaded;
        Ok(())
    }

    /// 当前记忆全文（注入 system prompt）
    pub async fn provide(&self) -> String {
        self.current.read().await.clone()
    }

    /// 根据一次非 approve 裁决提炼并追加一条偏好。
    /// 返回 Some(note) 表示已追加并持久化；模型返回空文本时不更新，返回 None。
    pub async fn extract(
        &self,
        req: &CopilotRequest,
        res: &CopilotResponse,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AgentError> {
        let prompt = {
            let current = self.current.read().await;
            memory_prompt(req, res, &current)
        };
        let messages = [Message::user(prompt)];

        let text = cancellable(cancel, async {
            self.model
                .complete(None, &messages)
                .await
                .map_err(AgentError::from)
        })
        .await?;

        let note = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if note.is_empty() {
            tracing::debug!("memory model returned no note");
            return Ok(None);
        }

        // 先持久化候选全文，成功后才更新内存中的记忆
        let mut current = self.current.write().await;
        let candidate = format!("{}{}\n", current.as_str(), note);
        self.backend.save(&candidate).await?;
        *current = candidate;
        drop(current);
        tracing::info!(note = %note, status = res.status.as_str(), "memory updated");
        Ok(Some(note))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Generation, LlmError, ScriptedLlmClient};

    fn request() -> CopilotRequest {
        CopilotRequest {
            file_id: "doc.md".into(),
            src_string: "Hello world".into(),
            translate_string: "Bonjour le monde".into(),
        }
    }

    #[tokio::test]
    async fn test_two_rejections_accumulate() {
        let backend = Arc::new(InMemoryBackend::new());
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Generation::text("Prefer formal tone"),
            Generation::text("  Keep brand names\n"),
        ]));
        let store = MemoryStore::new(backend.clone(), llm.clone());
        store.init().await.unwrap();
        let cancel = CancellationToken::new();

        let n1 = store
            .extract(&request(), &CopilotResponse::reject("too casual"), &cancel)
            .await
            .unwrap();
        let n2 = store
            .extract(&request(), &CopilotResponse::refined("Salut monde"), &cancel)
            .await
            .unwrap();

        assert_eq!(n1.as_deref(), Some("Prefer formal tone"));
        assert_eq!(n2.as_deref(), Some("Keep brand names"));
        let expected = "Prefer formal tone\nKeep brand names\n";
        assert_eq!(store.provide().await, expected);
        assert_eq!(backend.persisted().as_deref(), Some(expected));

        let prompts = llm.requests();
        assert!(prompts[0].messages[0].text().contains("Reason: too casual"));
        let second = prompts[1].messages[0].text();
        assert!(second.contains("<from>\nBonjour le monde\n</from>"));
        assert!(second.contains("<to>\nSalut monde\n</to>"));
        assert!(second.contains("<profile>\nPrefer formal tone\n"));
    }

    #[tokio::test]
    async fn test_model_failure_leaves_memory_untouched() {
        let backend = Arc::new(InMemoryBackend::with_content("existing\n"));
        let llm = Arc::new(ScriptedLlmClient::with_results(vec![Err(LlmError::Api(
            "boom".into(),
        ))]));
        let store = MemoryStore::new(backend.clone(), llm);
        store.init().await.unwrap();

        let err = store
            .extract(&request(), &CopilotResponse::reject("no"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(store.provide().await, "existing\n");
        assert_eq!(backend.persisted().as_deref(), Some("existing\n"));
    }

    struct ReadOnlyBackend;

    #[async_trait]
    impl MemoryBackend for ReadOnlyBackend {
        async fn load(&self) -> std::io::Result<Option<String>> {
            Ok(Some("existing\n".into()))
        }

        async fn save(&self, _content: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_untouched() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Generation::text("Prefer formal tone")]));
        let store = MemoryStore::new(Arc::new(ReadOnlyBackend), llm);
        store.init().await.unwrap();

        let err = store
            .extract(&request(), &CopilotResponse::reject("too casual"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Io(_)));
        assert_eq!(store.provide().await, "existing\n");
    }

    #[tokio::test]
    async fn test_file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.txt");
        let backend = Arc::new(FileMemoryBackend::new(&path));
        let llm = Arc::new(ScriptedLlmClient::new(vec![Generation::text("Use UK spelling")]));
        let store = MemoryStore::new(backend, llm);
        store.init().await.unwrap();
        assert_eq!(store.provide().await, "");

        store
            .extract(&request(), &CopilotResponse::reject("US spelling"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Use UK spelling\n");
    }

    #[tokio::test]
    async fn test_empty_note_is_not_appended() {
        let backend = Arc::new(InMemoryBackend::new());
        let llm = Arc::new(ScriptedLlmClient::new(vec![Generation::empty()]));
        let store = MemoryStore::new(backend.clone(), llm);
        let note = store
            .extract(&request(), &CopilotResponse::reject("x"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(note.is_none());
        assert!(backend.persisted().is_none());
    }
}
