//! 从对话历史推导某个文件的翻译进度
//!
//! 源文档取最近一次 read 该文件的工具结果；已接受单元为该文件上 status 为 approve / refined 的
//! translate 结果，按出现顺序拼接得到已接受的源前缀与当前译文。

use std::collections::HashMap;

use serde::Serialize;

use crate::copilot::{CopilotRequest, CopilotResponse, CopilotStatus};
use crate::memory::{Message, ToolCall};

/// 已接受的一个翻译单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedUnit {
    pub src_string: String,
    pub translated_string: String,
    pub status: CopilotStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationState {
    pub file_id: String,
    /// 模型最近一次读到的源文档
    pub document: Option<String>,
    pub accepted: Vec<AcceptedUnit>,
}

fn normalize(path: &str) -> &str {
    path.trim().trim_start_matches("./")
}

impl TranslationState {
    pub fn from_history(history: &[Message], file_id: &str) -> Self {
        let wanted = normalize(file_id);
        let mut calls: HashMap<&str, &ToolCall> = HashMap::new();
        let mut state = TranslationState {
            file_id: wanted.to_string(),
            ..Default::default()
        };

        for message in history {
            match message {
                Message::Assistant(_) => {
                    for call in message.tool_calls() {
                        calls.entry(call.id.as_str()).or_insert(call);
                    }
                }
                Message::Tool(results) => {
                    for result in results {
                        let Some(call) = calls.get(result.call_id.as_str()) else {
                            continue;
                        };
                        match call.name.as_str() {
                            "read" => {
                                let path = call.input.get("file_path").and_then(|v| v.as_str());
                                let content = result.output.get("content").and_then(|v| v.as_str());
                                if let (Some(path), Some(content)) = (path, content) {
                                    if normalize(path) == wanted {
                                        state.document = Some(content.to_string());
                                    }
                                }
                            }
                            "translate" => {
                                let Ok(req) = serde_json::from_value::<CopilotRequest>(call.input.clone())
                                else {
                                    continue;
                                };
                                let Ok(res) =
                                    serde_json::from_value::<CopilotResponse>(result.output.clone())
                                else {
                                    continue;
                                };
                                if normalize(&req.file_id) != wanted || res.status == CopilotStatus::Reject {
                                    continue;
                                }
                                state.accepted.push(AcceptedUnit {
                                    src_string: req.src_string,
                                    translated_string: res.translated_string,
                                    status: res.status,
                                });
                            }
                            _ => {}
                        }
                    }
                }
                Message::User(_) => {}
            }
        }
        state
    }

    /// 已接受单元的源文拼接
    pub fn accepted_source(&self) -> String {
        self.accepted.iter().map(|u| u.src_string.as_str()).collect()
    }

    /// 当前译文
    pub fn translation(&self) -> String {
        self.accepted.iter().map(|u| u.translated_string.as_str()).collect()
    }
}
