//! 会话级 Agent 句柄
//!
//! create_agent_components 按配置构建可多会话共享的组件（Turn Engine、三个模型角色、偏好记忆）；
//! Agent 持有一个对话、可选的 Copilot Gate、运行监管与事件通道，提供 user_input / next /
//! run_until_idle / stop / compact。所有依赖都由构造者注入，没有全局状态。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::copilot::{CopilotGate, TranslationState};
use crate::core::{AgentError, RunSupervisor, StopHandle};
use crate::llm::{create_models, ModelSet};
use crate::memory::{
    CompactionOutcome, Conversation, ConversationPersistence, FileMemoryBackend, MemoryStore,
    Message, UserPart,
};
use crate::react::events::send_event;
use crate::react::{Actor, Planner, RunContext, StepOutcome, TurnEngine, TurnEvent};
use crate::tools::{builtin_registry, DocumentSet, ToolExecutor};

/// 预构建的 Agent 组件，可多会话共享
pub struct AgentComponents {
    pub engine: TurnEngine,
    pub models: ModelSet,
    pub memory: Option<Arc<MemoryStore>>,
}

impl AgentComponents {
    /// 用给定模型与文档集合组装（内置四个工具）
    pub fn new(models: ModelSet, docs: DocumentSet, memory: Option<Arc<MemoryStore>>) -> Self {
        let engine = TurnEngine::new(
            Planner::new(Arc::clone(&models.translator)),
            ToolExecutor::new(builtin_registry(docs)),
        );
        Self {
            engine,
            models,
            memory,
        }
    }
}

/// 按配置创建组件：OpenAI 兼容客户端、文档根目录、文件偏好记忆（启动时加载）
pub async fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let models = create_models(cfg);
    let docs = DocumentSet::new(&cfg.app.documents_root);
    let memory = Arc::new(MemoryStore::new(
        Arc::new(FileMemoryBackend::new(&cfg.app.memory_path)),
        Arc::clone(&models.memory),
    ));
    memory.init().await?;
    tracing::info!(
        documents_root = %docs.root().display(),
        memory_path = %cfg.app.memory_path.display(),
        translator = %cfg.llm.translator_model,
        "agent components ready"
    );
    Ok(AgentComponents::new(models, docs, Some(memory)))
}

/// 一次 run_until_idle 的结果
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub steps: Vec<StepOutcome>,
    /// 是否因 stop() 提前结束
    pub cancelled: bool,
}

impl RunOutcome {
    /// 本次运行追加的全部消息
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.steps.iter().flat_map(|s| s.messages.iter())
    }
}

pub struct Agent {
    components: Arc<AgentComponents>,
    conversation: Conversation,
    copilot: Option<Arc<CopilotGate>>,
    supervisor: RunSupervisor,
    events: Option<UnboundedSender<TurnEvent>>,
}

impl Agent {
    pub fn new(components: Arc<AgentComponents>) -> Self {
        Self {
            components,
            conversation: Conversation::new(),
            copilot: None,
            supervisor: RunSupervisor::new(),
            events: None,
        }
    }

    /// 以已持久化的历史为种子
    pub fn with_history(mut self, messages: Vec<Message>) -> Self {
        self.conversation = Conversation::from_history(messages);
        self
    }

    /// 配置审核 gate；不配置时 translate 自动 approve
    pub fn with_copilot(mut self, gate: Arc<CopilotGate>) -> Self {
        self.copilot = Some(gate);
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn components(&self) -> &Arc<AgentComponents> {
        &self.components
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn snapshot(&self) -> &[Message] {
        self.conversation.snapshot()
    }

    /// 追加一条用户文本消息（注入用户内容的唯一入口）
    pub fn user_input(&mut self, text: impl Into<String>) {
        self.conversation.append([Message::user(text)]);
    }

    /// 追加一条多片段用户消息（文本 / 图片 / 文件）
    pub fn user_message(&mut self, parts: Vec<UserPart>) {
        self.conversation.append([Message::User(parts)]);
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.supervisor.stop_handle()
    }

    /// 取消当前运行中的模型调用 / 工具执行 / 审核等待
    pub fn stop(&self) {
        self.supervisor.cancel();
    }

    async fn step(&mut self, cancel: &CancellationToken) -> Result<StepOutcome, AgentError> {
        let run = RunContext {
            cancel,
            copilot: self.copilot.as_deref(),
            memory: self.components.memory.as_deref(),
            events: self.events.as_ref(),
            completed: None,
        };
        self.components.engine.next(&mut self.conversation, &run).await
    }

    /// 单步执行（新的取消范围）
    pub async fn next(&mut self) -> Result<StepOutcome, AgentError> {
        let cancel = self.supervisor.begin_run();
        self.step(&cancel).await
    }

    /// 反复 next() 直到轮到用户；取消被静默吞掉，其他错误记录后返回
    pub async fn run_until_idle(&mut self) -> Result<RunOutcome, AgentError> {
        let cancel = self.supervisor.begin_run();
        let mut outcome = RunOutcome::default();
        loop {
            send_event(
                self.events.as_ref(),
                TurnEvent::Step {
                    step: outcome.steps.len() + 1,
                },
            );
            match self.step(&cancel).await {
                Ok(step) => {
                    let actor = step.actor;
                    outcome.steps.push(step);
                    if actor == Actor::User {
                        send_event(self.events.as_ref(), TurnEvent::Idle);
                        return Ok(outcome);
                    }
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(steps = outcome.steps.len(), "run cancelled");
                    outcome.cancelled = true;
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::error!(error = %e, steps = outcome.steps.len(), "agent loop halted");
                    send_event(
                        self.events.as_ref(),
                        TurnEvent::Error {
                            text: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            }
        }
    }

    /// 用 compactor 模型压缩活动上下文
    pub async fn compact(&mut self) -> Result<CompactionOutcome, AgentError> {
        let cancel = self.supervisor.begin_run();
        let compactor = Arc::clone(&self.components.models.compactor);
        let outcome = self.conversation.compact(compactor.as_ref(), &cancel).await?;
        send_event(
            self.events.as_ref(),
            TurnEvent::Compacted {
                summary_chars: outcome.summary.chars().count(),
            },
        );
        Ok(outcome)
    }

    /// 某个文件当前的翻译进度
    pub fn translation_state(&self, file_id: &str) -> TranslationState {
        TranslationState::from_history(self.conversation.snapshot(), file_id)
    }

    pub fn save(&self, store: &ConversationPersistence) -> anyhow::Result<()> {
        store.save(self.conversation.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::llm::{Generation, LlmError, ScriptedLlmClient};

    fn agent_with(llm: Arc<ScriptedLlmClient>) -> (tempfile::TempDir, Agent) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Hello world.").unwrap();
        let components = AgentComponents::new(ModelSet::uniform(llm), DocumentSet::new(dir.path()), None);
        (dir, Agent::new(Arc::new(components)))
    }

    #[tokio::test]
    async fn test_run_until_idle_auto_approves_without_gate() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Generation::with_tool_calls(None, vec![("read", json!({"file_path": "a.md"}))]),
            Generation::with_tool_calls(
                None,
                vec![(
                    "translate",
                    json!({"file_id": "a.md", "src_string": "Hello world.", "translate_string": "Bonjour le monde."}),
                )],
            ),
            Generation::text("Translation finished."),
        ]));
        let (_dir, mut agent) = agent_with(llm);
        let (tx, mut rx) = mpsc::unbounded_channel();
        agent = agent.with_events(tx);
        agent.user_input("Translate a.md to French");

        let outcome = agent.run_until_idle().await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.steps.len(), 5);
        assert_eq!(agent.snapshot().len(), 6);
        assert_eq!(agent.translation_state("a.md").translation(), "Bonjour le monde.");

        let mut idle = false;
        while let Ok(ev) = rx.try_recv() {
            idle |= matches!(ev, TurnEvent::Idle);
        }
        assert!(idle);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_conversation_intact() {
        let llm = Arc::new(ScriptedLlmClient::with_results(vec![Err(LlmError::Api("503".into()))]));
        let (_dir, mut agent) = agent_with(llm);
        agent.user_input("hi");
        let err = agent.run_until_idle().await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(agent.snapshot(), &[Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_compact_uses_compactor_model() {
        let translator = Arc::new(ScriptedLlmClient::new(vec![]));
        let compactor = Arc::new(ScriptedLlmClient::new(vec![Generation::text("<summary>short</summary>")]));
        let dir = tempfile::tempdir().unwrap();
        let models = ModelSet {
            translator: translator.clone(),
            memory: translator.clone(),
            compactor: compactor.clone(),
        };
        let mut agent = Agent::new(Arc::new(AgentComponents::new(models, DocumentSet::new(dir.path()), None)));
        agent.user_input("long talk");
        let out = agent.compact().await.unwrap();
        assert_eq!(out.summary, "short");
        assert_eq!(agent.conversation().active_context(), &[Message::assistant("short")]);
        assert_eq!(compactor.requests().len(), 1);
        assert!(translator.requests().is_empty());
    }
}
