//! Copilot：人工审核 translate 工具调用（审核请求/裁决、对齐校验、待审核表、进程内驱动、翻译进度）

pub mod alignment;
pub mod gate;
pub mod handler;
pub mod state;
pub mod types;

pub use alignment::{count_occurrences, decompose, validate, AlignmentError, ContextDisplay, CONTEXT_WINDOW};
pub use gate::{CopilotGate, ReviewRequest};
pub use handler::{clean_rejection_reason, serve_reviews, CopilotHandler};
pub use state::{AcceptedUnit, TranslationState};
pub use types::{CopilotRequest, CopilotResponse, CopilotStatus};
