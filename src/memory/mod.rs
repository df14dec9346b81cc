//! 记忆层：对话存储（完整历史 + 活动上下文）、上下文压缩、偏好记忆、持久化

pub mod compaction;
pub mod conversation;
pub mod persistence;
pub mod preferences;

pub use compaction::{parse_analysis_summary, CompactionOutcome, COMPACT_INSTRUCTION, SYSTEM_COMPACT};
pub use conversation::{
    unresolved_tool_calls, AssistantPart, Conversation, Message, Role, ToolCall, ToolResult,
    UserPart,
};
pub use persistence::ConversationPersistence;
pub use preferences::{memory_prompt, FileMemoryBackend, InMemoryBackend, MemoryBackend, MemoryStore};
