//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，默认 OpenRouter）。
//! 请求/响应使用 byot（自带 JSON 类型），以完整携带 tools、tool_calls 与 reasoning 字段。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{FinishReason, GenerateRequest, Generation, LlmClient, LlmError, ToolSchema};
use crate::memory::{AssistantPart, Message, ToolCall, UserPart};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// 内部消息 → OpenAI chat messages（tool 消息按结果拆成多条）
pub(crate) fn to_wire_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(s) = system {
        wire.push(json!({"role": "system", "content": s}));
    }
    for m in messages {
        match m {
            Message::User(parts) => {
                let content: Vec<Value> = parts
                    .iter()
                    .map(|p| match p {
                        UserPart::Text { text } => json!({"type": "text", "text": text}),
                        UserPart::Image { image, .. } => {
                            json!({"type": "image_url", "image_url": {"url": image}})
                        }
                        UserPart::File {
                            data, filename, ..
                        } => json!({
                            "type": "file",
                            "file": {"file_data": data, "filename": filename},
                        }),
                    })
                    .collect();
                wire.push(json!({"role": "user", "content": content}));
            }
            Message::Assistant(parts) => {
                let mut texts: Vec<String> = Vec::new();
                let mut calls: Vec<Value> = Vec::new();
                for p in parts {
                    match p {
                        AssistantPart::Text { text } => texts.push(text.clone()),
                        // 推理内容不回传
                        AssistantPart::Reasoning { .. } => {}
                        AssistantPart::ToolCall(call) => calls.push(json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.input.to_string(),
                            },
                        })),
                        AssistantPart::Image { .. } => texts.push("[image]".to_string()),
                        AssistantPart::File { filename, .. } => texts.push(format!(
                            "[file: {}]",
                            filename.as_deref().unwrap_or("unnamed")
                        )),
                    }
                }
                let content = if texts.is_empty() {
                    Value::Null
                } else {
                    Value::String(texts.join("\n"))
                };
                let mut msg = json!({"role": "assistant", "content": content});
                if !calls.is_empty() {
                    msg["tool_calls"] = Value::Array(calls);
                }
                wire.push(msg);
            }
            Message::Tool(results) => {
                for r in results {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": r.call_id,
                        "content": r.output.to_string(),
                    }));
                }
            }
        }
    }
    wire
}

pub(crate) fn to_wire_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                },
            })
        })
        .collect()
}

/// 解析 chat completion 响应的首个 choice
pub(crate) fn parse_response(response: &Value) -> Result<Generation, LlmError> {
    let choice = response
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(FinishReason::from_provider);
    let message = choice
        .get("message")
        .ok_or_else(|| LlmError::InvalidResponse("choice has no message".to_string()))?;

    let mut parts = Vec::new();
    let reasoning = message
        .get("reasoning_content")
        .or_else(|| message.get("reasoning"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    if let Some(r) = reasoning {
        parts.push(AssistantPart::Reasoning { text: r.to_string() });
    }
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(AssistantPart::Text { text: text.to_string() });
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").unwrap_or(&Value::Null);
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| LlmError::InvalidResponse("tool call without name".to_string()))?;
            let raw_args = function.get("arguments").and_then(Value::as_str).unwrap_or("");
            // 参数不是合法 JSON 时保留原始字符串，交给工具的输入校验报错
            let input = if raw_args.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(raw_args).unwrap_or_else(|_| Value::String(raw_args.to_string()))
            };
            parts.push(AssistantPart::ToolCall(ToolCall {
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                name: name.to_string(),
                input,
            }));
        }
    }

    let messages = if parts.is_empty() {
        Vec::new()
    } else {
        vec![Message::Assistant(parts)]
    };
    Ok(Generation {
        messages,
        finish_reason,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(request.system, request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(to_wire_tools(request.tools));
        }

        let response: Value = self
            .client
            .chat()
            .create_byot(body)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if let Some(usage) = response.get("usage") {
            let prompt = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let completion = usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            self.usage.add(prompt, completion);
        }

        parse_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolResult;

    #[test]
    fn test_parse_tool_calls_and_reasoning() {
        let resp = json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": "Reading the file first.",
                    "reasoning": "need the source",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "read", "arguments": "{\"file_path\":\"a.md\"}"}
                    }]
                }
            }]
        });
        let gen = parse_response(&resp).unwrap();
        assert_eq!(gen.finish_reason, Some(FinishReason::ToolCalls));
        let calls: Vec<_> = gen.messages[0].tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read");
        assert_eq!(calls[0].input["file_path"], "a.md");
        assert_eq!(gen.messages[0].text(), "Reading the file first.");
    }

    #[test]
    fn test_parse_bad_arguments_kept_as_string() {
        let resp = json!({"choices": [{"finish_reason": "tool_calls", "message": {
            "content": null,
            "tool_calls": [{"id": "c", "function": {"name": "ls", "arguments": "{oops"}}]
        }}]});
        let gen = parse_response(&resp).unwrap();
        let call = gen.messages[0].tool_calls().next().unwrap().clone();
        assert_eq!(call.input, Value::String("{oops".into()));
    }

    #[test]
    fn test_parse_empty_message_yields_no_messages() {
        let resp = json!({"choices": [{"finish_reason": "stop", "message": {"content": ""}}]});
        let gen = parse_response(&resp).unwrap();
        assert!(gen.messages.is_empty());
        assert!(parse_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_wire_messages_split_tool_results() {
        let msgs = vec![
            Message::user("hi"),
            Message::Assistant(vec![AssistantPart::ToolCall(ToolCall {
                id: "a".into(),
                name: "thinking".into(),
                input: json!({"content": "plan"}),
            })]),
            Message::tool_results(vec![
                ToolResult { call_id: "a".into(), tool_name: "thinking".into(), output: json!({"status": "done"}) },
                ToolResult { call_id: "b".into(), tool_name: "ls".into(), output: json!({"entries": []}) },
            ]),
        ];
        let wire = to_wire_messages(Some("sys"), &msgs);
        assert_eq!(wire.len(), 5);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], "{\"content\":\"plan\"}");
        assert_eq!(wire[3]["tool_call_id"], "a");
        assert_eq!(wire[4]["tool_call_id"], "b");
    }
}
