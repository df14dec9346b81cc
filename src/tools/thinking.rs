//! Thinking 工具：模型的草稿本，无副作用

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::schema::{parse_input, schema_value, to_output};
use crate::tools::{Tool, ToolContext, ToolError};

#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ThinkingInput {
    /// your thoughts
    pub content: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ThinkingOutput {
    /// the status of the thought process
    pub status: String,
}

pub struct ThinkingTool;

#[async_trait]
impl Tool for ThinkingTool {
    fn name(&self) -> &str {
        "thinking"
    }

    fn description(&self) -> &str {
        "Use this tool to output your thoughts step by step, which can be used to generate a plan or outline."
    }

    fn input_schema(&self) -> Value {
        schema_value::<ThinkingInput>()
    }

    fn output_schema(&self) -> Value {
        schema_value::<ThinkingOutput>()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        let _: ThinkingInput = parse_input(input)?;
        to_output(&ThinkingOutput {
            status: "done".to_string(),
        })
    }
}
