//! Copilot 审核请求与裁决

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 人工审核的三种结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopilotStatus {
    Approve,
    Reject,
    Refined,
}

impl CopilotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CopilotStatus::Approve => "approve",
            CopilotStatus::Reject => "reject",
            CopilotStatus::Refined => "refined",
        }
    }
}

/// translate 工具的输入，也是交给审核者的请求
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopilotRequest {
    /// The ID of the file being translated
    pub file_id: String,
    /// The PARTIAL source string to translate
    pub src_string: String,
    /// The draft translation of the source string
    pub translate_string: String,
}

/// 审核裁决；同时是 translate 工具的输出
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CopilotResponse {
    /// The status of human review, one of 'approve', 'reject', or 'refined'
    pub status: CopilotStatus,
    /// The translated string, with human review applied
    #[serde(default)]
    pub translated_string: String,
    /// The reason for the status, if applicable
    #[serde(default)]
    pub reason: String,
}

impl CopilotResponse {
    pub fn approve(translated: impl Into<String>) -> Self {
        Self {
            status: CopilotStatus::Approve,
            translated_string: translated.into(),
            reason: String::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            status: CopilotStatus::Reject,
            translated_string: String::new(),
            reason: reason.into(),
        }
    }

    pub fn refined(translated: impl Into<String>) -> Self {
        Self {
            status: CopilotStatus::Refined,
            translated_string: translated.into(),
            reason: String::new(),
        }
    }

    pub fn is_approve(&self) -> bool {
        self.status == CopilotStatus::Approve
    }
}
