//! LLM 层：客户端抽象与实现（OpenAI 兼容 / 脚本化 Mock），以及按角色划分的模型集合

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{RecordedRequest, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{FinishReason, GenerateRequest, Generation, LlmClient, LlmError, ToolSchema};

use crate::config::AppConfig;

/// 三个模型角色：翻译（Turn Engine）、记忆提炼、上下文压缩
#[derive(Clone)]
pub struct ModelSet {
    pub translator: Arc<dyn LlmClient>,
    pub memory: Arc<dyn LlmClient>,
    pub compactor: Arc<dyn LlmClient>,
}

impl ModelSet {
    /// 三个角色共用同一个客户端
    pub fn uniform(client: Arc<dyn LlmClient>) -> Self {
        Self {
            translator: Arc::clone(&client),
            memory: Arc::clone(&client),
            compactor: client,
        }
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet").finish_non_exhaustive()
    }
}

/// 根据配置创建三个 OpenAI 兼容客户端
pub fn create_models(cfg: &AppConfig) -> ModelSet {
    let api_key = cfg.llm.api_key();
    if api_key.is_none() {
        tracing::warn!(
            env = %cfg.llm.api_key_env,
            "no API key found, provider requests will fail"
        );
    }
    let make = |model: &str| -> Arc<dyn LlmClient> {
        Arc::new(OpenAiClient::new(
            Some(cfg.llm.base_url.as_str()),
            model,
            api_key.as_deref(),
        ))
    };
    ModelSet {
        translator: make(&cfg.llm.translator_model),
        memory: make(&cfg.llm.memory_model),
        compactor: make(&cfg.llm.compactor_model),
    }
}
