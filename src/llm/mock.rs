//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 按顺序弹出预设的 Generation；队列耗尽时返回 LlmError::Exhausted。每次请求都被记录，便于断言
//! system prompt、消息与工具集合。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GenerateRequest, Generation, LlmClient, LlmError};
use crate::memory::Message;

/// 记录下来的一次请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    /// 请求中携带的工具名
    pub tools: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Generation, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(generations: Vec<Generation>) -> Self {
        Self::with_results(generations.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<Generation, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, generation: Generation) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(generation));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                system: request.system.map(String::from),
                messages: request.messages.to_vec(),
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            });
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(Err(LlmError::Exhausted))
    }
}
