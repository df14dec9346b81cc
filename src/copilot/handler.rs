//! 进程内审核：CopilotHandler 回调 + 驱动任务
//!
//! 单进程前端实现 CopilotHandler，serve_reviews 从 gate 的接收端逐条取出请求、交给 handler、
//! 再把裁决 resolve 回 gate。任务只持有 gate 的 Weak 引用，gate 释放后自然退出。

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::copilot::{CopilotGate, CopilotResponse, ReviewRequest};

#[async_trait]
pub trait CopilotHandler: Send + Sync {
    async fn review(&self, review: &ReviewRequest) -> CopilotResponse;
}

/// 启动审核驱动任务
pub fn serve_reviews(
    gate: &Arc<CopilotGate>,
    mut rx: mpsc::UnboundedReceiver<ReviewRequest>,
    handler: Arc<dyn CopilotHandler>,
) -> JoinHandle<()> {
    let gate: Weak<CopilotGate> = Arc::downgrade(gate);
    tokio::spawn(async move {
        while let Some(review) = rx.recv().await {
            let response = handler.review(&review).await;
            let Some(gate) = gate.upgrade() else {
                break;
            };
            if let Err(e) = gate.resolve(&review.call_id, response) {
                tracing::warn!(call_id = %review.call_id, error = %e, "review answer dropped");
            }
        }
        tracing::debug!("review loop finished");
    })
}

/// 清理编辑器返回的拒绝原因：丢弃空行与以 # 开头的注释行
pub fn clean_rejection_reason(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_rejection_reason() {
        let raw = "# Write the reason below\n\nToo literal.\n  # hint\nKeep the idiom.\n\n";
        assert_eq!(clean_rejection_reason(raw), "Too literal.\nKeep the idiom.");
        assert_eq!(clean_rejection_reason("# only comments\n\n"), "");
    }
}
