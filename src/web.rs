//! HTTP 往返接口
//!
//! - `POST /api/next`：一次无状态往返（NextRequest → NextResponse）
//! - `GET /api/sessions`：会话列表
//! - `GET /api/sessions/:id`：会话完整历史

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::core::AgentError;
use crate::memory::Message;
use crate::session::{NextRequest, NextResponse, SessionRegistry, SessionSummary};

/// 接口错误：按 AgentError 映射状态码
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            AgentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::NoPendingReview
            | AgentError::ReviewNotPending(_)
            | AgentError::ReviewAlreadyPending(_)
            | AgentError::ReviewAlreadyResolved(_) => StatusCode::CONFLICT,
            AgentError::Llm(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/api/next", post(api_next))
        .route("/api/sessions", get(api_sessions_list))
        .route("/api/sessions/:id", get(api_session_history))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(registry)
}

async fn api_next(
    State(registry): State<Arc<SessionRegistry>>,
    Json(req): Json<NextRequest>,
) -> Result<Json<NextResponse>, ApiError> {
    Ok(Json(registry.next(req).await?))
}

async fn api_sessions_list(State(registry): State<Arc<SessionRegistry>>) -> Json<Vec<SessionSummary>> {
    Json(registry.list().await)
}

async fn api_session_history(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(registry.get_history(&id).await?))
}

/// 监听并服务；后台每分钟清理一次过期会话
pub async fn serve(registry: Arc<SessionRegistry>, bind: &str) -> anyhow::Result<()> {
    let sweeper = Arc::clone(&registry);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.cleanup_expired().await;
        }
    });

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Neu translator API: http://{}", listener.local_addr()?);
    axum::serve(listener, router(registry)).await?;
    Ok(())
}
