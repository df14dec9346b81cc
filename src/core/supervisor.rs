//! 运行监管：单次运行的取消范围
//!
//! 每次 run（驱动循环）开始时换一个新的 CancellationToken；StopHandle 可在其他任务中触发取消，
//! 模型调用、工具执行（含等待人工审阅）与记忆提炼都观察同一个 token。

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

/// 持有当前运行的取消令牌
#[derive(Debug, Clone)]
pub struct RunSupervisor {
    current: Arc<Mutex<CancellationToken>>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 开始新的一次运行：替换为未取消的新 token 并返回其克隆
    pub fn begin_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = token.clone();
        token
    }

    /// 当前运行的 token（未开始运行时为初始 token）
    pub fn token(&self) -> CancellationToken {
        self.lock().clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            current: Arc::clone(&self.current),
        }
    }

    pub fn cancel(&self) {
        self.lock().cancel();
    }
}

impl Default for RunSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 可跨任务传递的停止句柄（TUI 的 Esc、HTTP 断开等）
#[derive(Debug, Clone)]
pub struct StopHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

/// 在取消令牌下运行 future：先触发取消则丢弃 future 并返回 AgentError::Cancelled
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    if token.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AgentError::Cancelled),
        res = fut => res,
    }
}
