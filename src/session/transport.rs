//! 无状态往返协议
//!
//! 请求 `{sessionId?, userInput?, copilotResponse?}`，
//! 响应 `{sessionId, agentResponse: {type: "normal", result} | {type: "copilot", result}}`。

use serde::{Deserialize, Serialize};

use crate::copilot::{CopilotResponse, ReviewRequest};
use crate::react::StepOutcome;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_input: Option<String>,
    /// 对上一次往返返回的审核请求的裁决
    #[serde(default)]
    pub copilot_response: Option<CopilotResponse>,
}

impl NextRequest {
    pub fn user(session_id: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.map(String::from),
            user_input: Some(text.into()),
            copilot_response: None,
        }
    }

    pub fn copilot(session_id: &str, response: CopilotResponse) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            user_input: None,
            copilot_response: Some(response),
        }
    }

    pub fn resume(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "result", rename_all = "lowercase")]
pub enum AgentResponse {
    /// 完成了一步
    Normal(StepOutcome),
    /// 需要人工审核；下一次往返带上 copilotResponse
    Copilot(ReviewRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextResponse {
    pub session_id: String,
    pub agent_response: AgentResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::copilot::{ContextDisplay, CopilotRequest};

    #[test]
    fn test_request_accepts_partial_bodies() {
        let req: NextRequest = serde_json::from_value(json!({"userInput": "hi"})).unwrap();
        assert_eq!(req, NextRequest::user(None, "hi"));

        let req: NextRequest = serde_json::from_value(json!({
            "sessionId": "session_1",
            "copilotResponse": {"status": "reject", "reason": "tone"}
        }))
        .unwrap();
        assert_eq!(req.copilot_response, Some(CopilotResponse::reject("tone")));
    }

    #[test]
    fn test_copilot_response_shape() {
        let resp = NextResponse {
            session_id: "s".into(),
            agent_response: AgentResponse::Copilot(ReviewRequest {
                call_id: "c".into(),
                request: CopilotRequest {
                    file_id: "a.md".into(),
                    src_string: "Hi".into(),
                    translate_string: "Salut".into(),
                },
                display: ContextDisplay::default(),
            }),
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["sessionId"], "s");
        assert_eq!(v["agentResponse"]["type"], "copilot");
        assert_eq!(v["agentResponse"]["result"]["callId"], "c");
        assert_eq!(v["agentResponse"]["result"]["src_string"], "Hi");
        assert_eq!(v["agentResponse"]["result"]["file_id"], "a.md");
    }
}
