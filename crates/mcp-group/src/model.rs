//! Catalog and invocation data exchanged with a server.
//!
//! Tool declarations and call results are the protocol library's own types, this module adds
//! the views the group needs on top of them: parsed parameters, the declared return type,
//! argument checks and output extraction.
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod output;
mod schema;

pub use ::rmcp::model::{
    CallToolResult, Content, JsonObject, RawContent, ResourceContents, Tool as ToolDefinition,
};
pub(crate) use output::into_output;
pub use schema::*;

/// Named arguments of one call, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(JsonObject);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    pub fn into_object(self) -> JsonObject {
        self.0
    }
}

impl From<JsonObject> for Arguments {
    fn from(value: JsonObject) -> Self {
        Arguments(value)
    }
}

impl TryFrom<Value> for Arguments {
    type Error = crate::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => Ok(Arguments(object)),
            Value::Null => Ok(Arguments::new()),
            other => Err(crate::Error::Usage(
                format!("arguments must be a JSON object, got {other}").into(),
            )),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Arguments(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn tool_views_from_wire() {
        let tool: ToolDefinition = serde_json::from_value(json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]
            },
            "outputSchema": {
                "type": "object",
                "properties": {"result": {"type": "integer"}}
            },
            "annotations": {"readOnlyHint": true}
        }))
        .unwrap();
        assert_eq!(tool.name, "add");
        assert_eq!(return_type(tool.output_schema.as_deref()), Some("integer"));
        let names: Vec<_> = parameters(&tool.input_schema)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert!(tool.annotations.is_some());
    }

    #[test]
    fn missing_output_schema() {
        let tool: ToolDefinition = serde_json::from_value(json!({
            "name": "ping",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert!(tool.description.is_none());
        assert_eq!(return_type(tool.output_schema.as_deref()), None);
        assert!(parameters(&tool.input_schema).is_empty());
    }

    #[test]
    fn arguments_keep_insertion_order() {
        let arguments = Arguments::new().arg("b", 2).arg("a", 1);
        let keys: Vec<_> = arguments.as_object().keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);

        let collected: Arguments = [("x", json!(true))].into_iter().collect();
        assert_eq!(collected.get("x"), Some(&json!(true)));
    }

    #[test]
    fn arguments_from_value() {
        let arguments = Arguments::try_from(json!({"a": 1})).unwrap();
        assert_eq!(arguments, Arguments::from(object(json!({"a": 1}))));
        assert!(Arguments::try_from(Value::Null).unwrap().is_empty());
        assert!(Arguments::try_from(json!([1, 2])).is_err());
    }
}
