//! 会话注册表（无状态传输）
//!
//! 每次往返运行一次 Turn Engine 步骤，并配一个新的 Copilot Gate：
//! - 已有答复的审核请求立即 resolve；
//! - 出现没有答复的审核请求后，等其余进行中的调用都完成或同样停在审核上，再放弃本步骤
//!   （不追加任何消息），第一个未答复的请求记为 awaiting；
//! - 已完成调用的结果留在会话里，重放同一步骤时直接复用，不再执行（记忆提炼不会重复）；
//! - 下次往返带来的 copilotResponse 存入答复表，重放同一步骤时使用。
//! 每个会话由自己的 tokio Mutex 串行化；空闲超时的会话由 cleanup_expired 清理。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agent::AgentComponents;
use crate::copilot::{CopilotGate, CopilotResponse, ReviewRequest};
use crate::core::AgentError;
use crate::memory::{Conversation, Message, ToolResult};
use crate::react::{RunContext, StepOutcome, TurnEvent};
use crate::session::{AgentResponse, NextRequest, NextResponse};

/// 会话 ID
pub type SessionId = String;

pub struct Session {
    pub id: SessionId,
    pub conversation: Conversation,
    /// call id → 已收到的审核裁决
    answers: HashMap<String, CopilotResponse>,
    /// call id → 被放弃的步骤中已完成的工具结果
    completed: HashMap<String, ToolResult>,
    /// 上一次往返交给前端、尚未答复的审核请求
    awaiting: Option<ReviewRequest>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            conversation: Conversation::new(),
            answers: HashMap::new(),
            completed: HashMap::new(),
            awaiting: None,
            last_active: Instant::now(),
        }
    }

    pub fn awaiting(&self) -> Option<&ReviewRequest> {
        self.awaiting.as_ref()
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }
}

/// 会话列表项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub messages: usize,
    pub awaiting_review: bool,
    pub idle_secs: u64,
}

enum StepState {
    Done(StepOutcome),
    Suspended(ReviewRequest),
}

pub struct SessionRegistry {
    components: Arc<AgentComponents>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(components: Arc<AgentComponents>, idle_timeout_secs: u64) -> Self {
        Self {
            components,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        }
    }

    /// 新建空会话
    pub async fn create(&self) -> SessionId {
        let session = Session::new();
        let id = session.id.clone();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %id, "session created");
        id
    }

    async fn get(&self, id: &str) -> Result<Arc<Mutex<Session>>, AgentError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    /// 一次往返
    pub async fn next(&self, request: NextRequest) -> Result<NextResponse, AgentError> {
        let session_id = match request.session_id {
            Some(id) => id,
            None => self.create().await,
        };
        let handle = self.get(&session_id).await?;
        let mut session = handle.lock().await;
        session.last_active = Instant::now();

        if let Some(response) = request.copilot_response {
            let awaiting = session.awaiting.take().ok_or(AgentError::NoPendingReview)?;
            tracing::debug!(session_id = %session_id, call_id = %awaiting.call_id, "copilot answer stored");
            session.answers.insert(awaiting.call_id, response);
        }

        if let Some(text) = request.user_input.filter(|t| !t.trim().is_empty()) {
            session.conversation.append([Message::user(text)]);
        }

        let agent_response = self.step(&mut session).await?;
        session.last_active = Instant::now();
        Ok(NextResponse {
            session_id,
            agent_response,
        })
    }

    async fn step(&self, session: &mut Session) -> Result<AgentResponse, AgentError> {
        let (gate, mut reviews) = CopilotGate::new();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let Session {
            conversation,
            answers,
            completed,
            awaiting,
            ..
        } = session;

        let in_flight: HashSet<String> = conversation
            .unresolved_tool_calls()
            .into_iter()
            .map(|c| c.id)
            .collect();
        let run = RunContext {
            cancel: &cancel,
            copilot: Some(&gate),
            memory: self.components.memory.as_deref(),
            events: Some(&events_tx),
            completed: Some(&*completed),
        };

        // 已完成或停在未答复审核上的调用
        let mut settled: HashSet<String> = HashSet::new();
        let mut finished: Vec<ToolResult> = Vec::new();
        let mut unanswered: Option<ReviewRequest> = None;

        let step = {
            let step = self.components.engine.next(conversation, &run);
            tokio::pin!(step);
            loop {
                if in_flight.is_subset(&settled) {
                    if let Some(review) = unanswered.take() {
                        break StepState::Suspended(review);
                    }
                }
                tokio::select! {
                    res = &mut step => break StepState::Done(res?),
                    Some(event) = events.recv() => {
                        if let TurnEvent::ToolResult { call_id, tool, output } = event {
                            settled.insert(call_id.clone());
                            finished.push(ToolResult { call_id, tool_name: tool, output });
                        }
                    }
                    Some(review) = reviews.recv() => {
                        match answers.get(&review.call_id) {
                            Some(answer) => gate.resolve(&review.call_id, answer.clone())?,
                            None => {
                                settled.insert(review.call_id.clone());
                                if unanswered.is_none() {
                                    unanswered = Some(review);
                                }
                            }
                        }
                    }
                }
            }
        };

        match step {
            StepState::Suspended(review) => {
                // 放弃进行中的步骤：未追加任何消息
                cancel.cancel();
                for result in finished {
                    completed.insert(result.call_id.clone(), result);
                }
                tracing::debug!(
                    call_id = %review.call_id,
                    reusable = completed.len(),
                    "step suspended for copilot review"
                );
                *awaiting = Some(review.clone());
                Ok(AgentResponse::Copilot(review))
            }
            StepState::Done(outcome) => {
                let open: HashSet<&str> = outcome
                    .unresolved_tool_calls
                    .iter()
                    .map(|c| c.id.as_str())
                    .collect();
                answers.retain(|id, _| open.contains(id.as_str()));
                completed.retain(|id, _| open.contains(id.as_str()));
                Ok(AgentResponse::Normal(outcome))
            }
        }
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let handles: Vec<Arc<Mutex<Session>>> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let s = handle.lock().await;
            out.push(SessionSummary {
                id: s.id.clone(),
                messages: s.conversation.len(),
                awaiting_review: s.awaiting.is_some(),
                idle_secs: s.last_active.elapsed().as_secs(),
            });
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// 完整历史
    pub async fn get_history(&self, id: &str) -> Result<Vec<Message>, AgentError> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        Ok(session.conversation.snapshot().to_vec())
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// 清理空闲超时的会话；正在处理请求的会话跳过
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|s| s.is_expired(self.idle_timeout))
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired sessions removed");
        }
        expired.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Generation, ModelSet, ScriptedLlmClient};
    use crate::tools::DocumentSet;

    fn registry(llm: Arc<ScriptedLlmClient>, timeout: u64) -> (tempfile::TempDir, SessionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let components = AgentComponents::new(ModelSet::uniform(llm), DocumentSet::new(dir.path()), None);
        (dir, SessionRegistry::new(Arc::new(components), timeout))
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (_dir, reg) = registry(Arc::new(ScriptedLlmClient::new(vec![])), 60);
        let err = reg.next(NextRequest::resume("session_missing")).await.unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(id) if id == "session_missing"));
        assert!(matches!(
            reg.get_history("session_missing").await,
            Err(AgentError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_first_contact_creates_session() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Generation::text("Which file?")]));
        let (_dir, reg) = registry(llm, 60);
        let resp = reg.next(NextRequest::user(None, "hello")).await.unwrap();
        assert!(resp.session_id.starts_with("session_"));
        match resp.agent_response {
            AgentResponse::Normal(outcome) => {
                assert_eq!(outcome.messages, vec![Message::assistant("Which file?")])
            }
            AgentResponse::Copilot(_) => panic!("unexpected review"),
        }
        let history = reg.get_history(&resp.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(reg.list().await[0].messages, 2);
    }

    #[tokio::test]
    async fn test_copilot_response_without_review_is_rejected() {
        let (_dir, reg) = registry(Arc::new(ScriptedLlmClient::new(vec![])), 60);
        let id = reg.create().await;
        let err = reg
            .next(NextRequest::copilot(&id, CopilotResponse::approve("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoPendingReview));
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (_dir, reg) = registry(Arc::new(ScriptedLlmClient::new(vec![])), 0);
        reg.create().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(reg.cleanup_expired().await, 1);
        assert_eq!(reg.active_count().await, 0);
    }
}
