//! 工具输入/输出的 JSON Schema 与类型化解析（schemars 自动生成 Schema）
//!
//! 每个工具以 struct 声明输入输出；schema_value 生成发给模型的 schema，parse_input 把模型给出的 JSON
//! 反序列化为输入类型，失败时返回 ToolError::InvalidInput（以工具输出的形式回到模型）。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolError;

/// 生成类型 T 的 JSON Schema；去掉顶层 $schema / title，保留 properties 与 definitions
pub fn schema_value<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 反序列化工具输入
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// 序列化工具输出
pub fn to_output<T: Serialize>(output: &T) -> Result<Value, ToolError> {
    serde_json::to_value(output).map_err(|e| ToolError::Failed(format!("output encoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct Probe {
        /// a path
        path: String,
        #[serde(default)]
        ignore: Option<Vec<String>>,
    }

    #[test]
    fn test_schema_has_required_path() {
        let s = schema_value::<Probe>();
        assert!(s.get("$schema").is_none());
        assert_eq!(s["type"], "object");
        assert_eq!(s["properties"]["path"]["description"], "a path");
        assert_eq!(s["required"], json!(["path"]));
    }

    #[test]
    fn test_parse_input_reports_missing_field() {
        let err = parse_input::<Probe>(json!({"ignore": []})).err().unwrap();
        assert!(matches!(err, ToolError::InvalidInput(msg) if msg.contains("path")));
        assert!(parse_input::<Probe>(Value::String("{oops".into())).is_err());
    }
}
