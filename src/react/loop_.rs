//! Turn Engine：每次 next() 决定本步做什么
//!
//! 1. 活动上下文为空 → 轮到用户，什么都不做。
//! 2. 存在未解决的工具调用 → 先确认全部工具已注册，再并发执行，结果按调用顺序合成一条 tool 消息，轮到 agent。
//! 3. 否则调用翻译模型（system prompt 含偏好记忆，附带全部工具 schema）；无输出 → 轮到用户；
//!    最后一条为助手消息 → 轮到用户；产生了工具调用 → 轮到 agent。
//!
//! 本步产出的消息在最后一次性追加：取消或失败时对话不会出现半个步骤。

use std::collections::HashMap;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::copilot::CopilotGate;
use crate::core::{cancellable, AgentError};
use crate::llm::FinishReason;
use crate::memory::{Conversation, MemoryStore, Message, ToolCall, ToolResult};
use crate::react::events::send_event;
use crate::react::{Planner, TurnEvent};
use crate::tools::{ToolContext, ToolExecutor};

/// 下一步该谁行动
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    Agent,
}

/// 一次 next() 的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub actor: Actor,
    /// 追加之后仍未解决的工具调用（供审核前端查看）
    pub unresolved_tool_calls: Vec<ToolCall>,
    /// 本步追加的消息
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// 单次运行共享的选项：取消令牌、审核 gate、偏好记忆、事件通道
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub cancel: &'a CancellationToken,
    pub copilot: Option<&'a CopilotGate>,
    pub memory: Option<&'a MemoryStore>,
    pub events: Option<&'a UnboundedSender<TurnEvent>>,
    /// 之前被放弃的同一步骤中已完成的工具结果（call id → 结果）；命中时不再执行
    pub completed: Option<&'a HashMap<String, ToolResult>>,
}

impl<'a> RunContext<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            copilot: None,
            memory: None,
            events: None,
            completed: None,
        }
    }
}

struct Step {
    messages: Vec<Message>,
    actor: Actor,
    finish_reason: Option<FinishReason>,
}

impl Step {
    fn idle(finish_reason: Option<FinishReason>) -> Self {
        Self {
            messages: Vec::new(),
            actor: Actor::User,
            finish_reason,
        }
    }
}

pub struct TurnEngine {
    planner: Planner,
    executor: ToolExecutor,
}

impl TurnEngine {
    pub fn new(planner: Planner, executor: ToolExecutor) -> Self {
        Self { planner, executor }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 执行一步并追加产出的消息
    pub async fn next(
        &self,
        conversation: &mut Conversation,
        run: &RunContext<'_>,
    ) -> Result<StepOutcome, AgentError> {
        let step = self.step(conversation, run).await?;
        conversation.append(step.messages.iter().cloned());
        let unresolved_tool_calls = conversation.unresolved_tool_calls();
        tracing::debug!(
            actor = ?step.actor,
            appended = step.messages.len(),
            unresolved = unresolved_tool_calls.len(),
            "turn step finished"
        );
        Ok(StepOutcome {
            actor: step.actor,
            unresolved_tool_calls,
            messages: step.messages,
            finish_reason: step.finish_reason,
        })
    }

    async fn step(&self, conversation: &Conversation, run: &RunContext<'_>) -> Result<Step, AgentError> {
        if conversation.active_context().is_empty() {
            return Ok(Step::idle(None));
        }

        let pending = conversation.unresolved_tool_calls();
        if !pending.is_empty() {
            // 未知工具使整步失败，且不执行任何工具
            self.executor.ensure_known(&pending)?;
            let history = conversation.snapshot();
            let results = cancellable(
                run.cancel,
                try_join_all(pending.iter().map(|call| self.run_tool(call, history, run))),
            )
            .await?;
            return Ok(Step {
                messages: vec![Message::tool_results(results)],
                actor: Actor::Agent,
                finish_reason: None,
            });
        }

        let memory = match run.memory {
            Some(m) => m.provide().await,
            None => String::new(),
        };
        let schemas = self.executor.registry().schemas();
        let context = conversation.active_context();
        send_event(
            run.events,
            TurnEvent::ModelCall {
                messages: context.len(),
                tools: schemas.len(),
            },
        );

        let generation = self.planner.plan(&memory, context, &schemas, run.cancel).await?;
        let tool_calls = generation
            .messages
            .iter()
            .map(|m| m.tool_calls().count())
            .sum::<usize>();
        send_event(
            run.events,
            TurnEvent::ModelResponse {
                text: generation.text_content(),
                tool_calls,
                finish_reason: generation.finish_reason.clone(),
            },
        );

        if generation.messages.is_empty() {
            return Ok(Step::idle(generation.finish_reason));
        }

        let mut actor = Actor::Agent;
        if matches!(generation.messages.last(), Some(Message::Assistant(_))) {
            actor = Actor::User;
        }
        if tool_calls > 0 {
            actor = Actor::Agent;
        }
        Ok(Step {
            messages: generation.messages,
            actor,
            finish_reason: generation.finish_reason,
        })
    }

    async fn run_tool(
        &self,
        call: &ToolCall,
        history: &[Message],
        run: &RunContext<'_>,
    ) -> Result<ToolResult, AgentError> {
        send_event(
            run.events,
            TurnEvent::ToolCall {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                input: call.input.clone(),
            },
        );
        let cached = run.completed.and_then(|done| done.get(&call.id));
        let result = match cached {
            Some(result) => {
                tracing::debug!(call_id = %call.id, tool = %call.name, "reusing completed tool result");
                result.clone()
            }
            None => {
                let ctx = ToolContext {
                    call_id: &call.id,
                    cancel: run.cancel,
                    history,
                    copilot: run.copilot,
                    memory: run.memory,
                };
                self.executor.execute(call, &ctx).await?
            }
        };
        send_event(
            run.events,
            TurnEvent::ToolResult {
                call_id: result.call_id.clone(),
                tool: result.tool_name.clone(),
                output: result.output.clone(),
            },
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::llm::{Generation, LlmClient, LlmError, ScriptedLlmClient};
    use crate::memory::AssistantPart;
    use crate::tools::{ThinkingTool, Tool, ToolError, ToolRegistry};

    /// 按输入中的 delay_ms 休眠后回显，用于验证结果顺序与完成顺序无关
    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleep"
        }
        fn description(&self) -> &str {
            "sleep then echo"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn output_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
            let ms = input["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({"echo": input["tag"].clone()}))
        }
    }

    fn engine(llm: Arc<dyn LlmClient>) -> TurnEngine {
        let mut registry = ToolRegistry::new();
        registry.register(ThinkingTool);
        registry.register(SleepTool);
        TurnEngine::new(Planner::new(llm), ToolExecutor::new(registry))
    }

    fn call(id: &str, name: &str, input: Value) -> AssistantPart {
        AssistantPart::ToolCall(ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        })
    }

    #[tokio::test]
    async fn test_empty_context_is_idempotent_noop() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let engine = engine(llm.clone());
        let mut conv = Conversation::new();
        let cancel = CancellationToken::new();
        for _ in 0..3 {
            let out = engine.next(&mut conv, &RunContext::new(&cancel)).await.unwrap();
            assert_eq!(out.actor, Actor::User);
            assert!(out.messages.is_empty());
            assert!(out.unresolved_tool_calls.is_empty());
        }
        assert!(conv.is_empty());
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_tool_results_keep_call_order() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let engine = engine(llm);
        let mut conv = Conversation::new();
        conv.append(vec![
            Message::user("go"),
            Message::Assistant(vec![
                call("slow", "sleep", json!({"delay_ms": 40, "tag": "first"})),
                call("fast", "sleep", json!({"delay_ms": 0, "tag": "second"})),
            ]),
        ]);
        let cancel = CancellationToken::new();
        let out = engine.next(&mut conv, &RunContext::new(&cancel)).await.unwrap();
        assert_eq!(out.actor, Actor::Agent);
        assert!(out.unresolved_tool_calls.is_empty());
        let results = out.messages[0].tool_result_parts();
        assert_eq!(results[0].call_id, "slow");
        assert_eq!(results[0].output, json!({"echo": "first"}));
        assert_eq!(results[1].call_id, "fast");
        assert_eq!(conv.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_step_without_appending() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let engine = engine(llm);
        let mut conv = Conversation::new();
        conv.append(vec![
            Message::user("go"),
            Message::Assistant(vec![
                call("a", "thinking", json!({"content": "x"})),
                call("b", "shell", json!({"cmd": "rm"})),
            ]),
        ]);
        let cancel = CancellationToken::new();
        let err = engine.next(&mut conv, &RunContext::new(&cancel)).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "shell"));
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn test_model_step_actor_rules() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Generation::with_tool_calls(Some("Let me plan."), vec![("thinking", json!({"content": "plan"}))]),
            Generation::text("Done, which file next?"),
            Generation::empty(),
        ]));
        let engine = engine(llm.clone());
        let mut conv = Conversation::new();
        conv.append(vec![Message::user("translate a.md")]);
        let cancel = CancellationToken::new();
        let run = RunContext::new(&cancel);

        let first = engine.next(&mut conv, &run).await.unwrap();
        assert_eq!(first.actor, Actor::Agent);
        assert_eq!(first.unresolved_tool_calls.len(), 1);
        assert_eq!(first.finish_reason, Some(FinishReason::ToolCalls));

        let tools = engine.next(&mut conv, &run).await.unwrap();
        assert_eq!(tools.actor, Actor::Agent);
        assert_eq!(tools.messages[0].tool_result_parts()[0].output, json!({"status": "done"}));

        let reply = engine.next(&mut conv, &run).await.unwrap();
        assert_eq!(reply.actor, Actor::User);
        assert_eq!(reply.messages, vec![Message::assistant("Done, which file next?")]);

        conv.append(vec![Message::user("thanks")]);
        let silent = engine.next(&mut conv, &run).await.unwrap();
        assert_eq!(silent.actor, Actor::User);
        assert!(silent.messages.is_empty());
        assert_eq!(conv.len(), 5);

        let requests = llm.requests();
        assert_eq!(requests[0].tools, vec!["sleep".to_string(), "thinking".to_string()]);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_completed_results_are_reused_not_rerun() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let engine = engine(llm);
        let mut conv = Conversation::new();
        conv.append(vec![
            Message::user("go"),
            Message::Assistant(vec![
                call("done", "sleep", json!({"delay_ms": 0, "tag": "fresh"})),
                call("open", "sleep", json!({"delay_ms": 0, "tag": "second"})),
            ]),
        ]);
        let mut completed = HashMap::new();
        completed.insert(
            "done".to_string(),
            ToolResult {
                call_id: "done".into(),
                tool_name: "sleep".into(),
                output: json!({"echo": "earlier"}),
            },
        );
        let cancel = CancellationToken::new();
        let run = RunContext {
            completed: Some(&completed),
            ..RunContext::new(&cancel)
        };
        let out = engine.next(&mut conv, &run).await.unwrap();
        let results = out.messages[0].tool_result_parts();
        assert_eq!(results[0].output, json!({"echo": "earlier"}));
        assert_eq!(results[1].output, json!({"echo": "second"}));
    }

    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn generate(&self, _request: crate::llm::GenerateRequest<'_>) -> Result<Generation, LlmError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_during_model_call_appends_nothing() {
        let engine = engine(Arc::new(HangingLlm));
        let mut conv = Conversation::new();
        conv.append(vec![Message::user("hi")]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = engine.next(&mut conv, &RunContext::new(&cancel)).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(conv.len(), 1);
    }
}
