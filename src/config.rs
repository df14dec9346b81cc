//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NEU__*` 覆盖（双下划线表示嵌套，如 `NEU__LLM__TRANSLATOR_MODEL=...`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub web: WebSection,
}

/// [app] 段：应用名、文档根目录、记忆文件
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// ls / read 的沙箱根目录
    #[serde(default = "default_documents_root")]
    pub documents_root: PathBuf,
    /// 偏好记忆文件（整体覆盖写）
    #[serde(default = "default_memory_path")]
    pub memory_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            documents_root: default_documents_root(),
            memory_path: default_memory_path(),
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("./memory.txt")
}

/// [llm] 段：端点与三个模型角色
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 存放 API Key 的环境变量名；未设置时回退 OPENAI_API_KEY
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_translator_model")]
    pub translator_model: String,
    #[serde(default = "default_memory_model")]
    pub memory_model: String,
    #[serde(default = "default_compactor_model")]
    pub compactor_model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            translator_model: default_translator_model(),
            memory_model: default_memory_model(),
            compactor_model: default_compactor_model(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_translator_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_memory_model() -> String {
    "google/gemini-2.5-flash-lite".to_string()
}

fn default_compactor_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

impl LlmSection {
    /// 读取 API Key：先 api_key_env 指定的变量，再 OPENAI_API_KEY
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// [session] 段：无状态传输下的会话过期
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// 从 config 目录加载配置，环境变量 NEU__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NEU__*（双下划线表示嵌套键）
/// 文件语法错误或字段类型不符时返回 AgentError::Config
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NEU")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    Ok(c.try_deserialize()?)
}
