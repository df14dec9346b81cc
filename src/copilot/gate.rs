//! Copilot Gate：按 tool-call id 索引的待审核表
//!
//! translate 执行器通过 request 挂起，等待审核者对同一 call id 调用 resolve。每个 id 至多被解决一次：
//! 未挂起的 id 返回 ReviewNotPending，重复解决返回 ReviewAlreadyResolved；同一 id 重复挂起返回
//! ReviewAlreadyPending（已解决过的 id 再挂起返回 ReviewAlreadyResolved）。挂起的 future 被丢弃
//! （取消、步骤被放弃）时，表项随之移除。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::copilot::{ContextDisplay, CopilotRequest, CopilotResponse};
use crate::core::{cancellable, AgentError};

/// 交给审核前端的一条待审核请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub call_id: String,
    /// 平铺：前端直接读取 file_id / src_string / translate_string
    #[serde(flatten)]
    pub request: CopilotRequest,
    pub display: ContextDisplay,
}

#[derive(Debug)]
pub struct CopilotGate {
    pending: Mutex<HashMap<String, oneshot::Sender<CopilotResponse>>>,
    resolved: Mutex<HashSet<String>>,
    notify: mpsc::UnboundedSender<ReviewRequest>,
}

/// 挂起期间持有；drop 时清理未解决的表项
struct PendingGuard<'a> {
    gate: &'a CopilotGate,
    call_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.gate
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.call_id);
    }
}

impl CopilotGate {
    /// 返回 gate 与待审核请求的接收端（审核前端从中读取）
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReviewRequest>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Mutex::new(HashMap::new()),
                resolved: Mutex::new(HashSet::new()),
                notify,
            },
            rx,
        )
    }

    /// 挂起直到该 call id 被 resolve；无超时，只响应取消
    pub async fn request(
        &self,
        call_id: &str,
        request: CopilotRequest,
        display: ContextDisplay,
        cancel: &CancellationToken,
    ) -> Result<CopilotResponse, AgentError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.contains_key(call_id) {
                return Err(AgentError::ReviewAlreadyPending(call_id.to_string()));
            }
            if self
                .resolved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(call_id)
            {
                return Err(AgentError::ReviewAlreadyResolved(call_id.to_string()));
            }
            pending.insert(call_id.to_string(), tx);
        }
        let _guard = PendingGuard {
            gate: self,
            call_id,
        };

        tracing::debug!(call_id = %call_id, src = %request.src_string, "copilot review pending");
        let review = ReviewRequest {
            call_id: call_id.to_string(),
            request,
            display,
        };
        if self.notify.send(review).is_err() {
            tracing::warn!(call_id = %call_id, "no review listener, waiting for resolve or cancellation");
        }

        cancellable(cancel, async { rx.await.map_err(|_| AgentError::Cancelled) }).await
    }

    /// 解决一个待审核请求（至多一次）
    pub fn resolve(&self, call_id: &str, response: CopilotResponse) -> Result<(), AgentError> {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(call_id);
        let Some(sender) = sender else {
            let already = self
                .resolved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(call_id);
            return Err(if already {
                AgentError::ReviewAlreadyResolved(call_id.to_string())
            } else {
                AgentError::ReviewNotPending(call_id.to_string())
            });
        };
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(call_id.to_string());
        tracing::debug!(call_id = %call_id, status = response.status.as_str(), "copilot review resolved");
        sender
            .send(response)
            .map_err(|_| AgentError::ReviewNotPending(call_id.to_string()))
    }

    /// 当前挂起的 call id（排序）
    pub fn pending(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(call_id)
    }
}
