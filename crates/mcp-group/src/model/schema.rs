use serde::Serialize;
use serde_json::Value;

use super::JsonObject;

/// One entry of `inputSchema.properties`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    /// The declared JSON type; a union type is joined with `|`.
    pub json_type: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<Value>,
}

fn required_names(schema: &JsonObject) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| required.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn declared_types(property: &Value) -> Vec<&str> {
    match property.get("type") {
        Some(Value::String(ty)) => vec![ty.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn parameters(schema: &JsonObject) -> Vec<Parameter> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required = required_names(schema);
    properties
        .iter()
        .map(|(name, property)| {
            let types = declared_types(property);
            Parameter {
                name: name.clone(),
                json_type: (!types.is_empty()).then(|| types.join("|")),
                description: property
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                required: required.contains(&name.as_str()),
                default: property.get("default").cloned(),
            }
        })
        .collect()
}

/// The JSON type of `outputSchema.properties.result`, if declared.
pub(crate) fn return_type(output_schema: Option<&JsonObject>) -> Option<&str> {
    output_schema
        .and_then(|schema| schema.get("properties"))
        .and_then(|properties| properties.get("result"))
        .and_then(|result| result.get("type"))
        .and_then(Value::as_str)
}

fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|number| number.fract() == 0.0)
        }
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // unknown type keywords are not ours to reject
        _ => true,
    }
}

/// Shape check of call arguments: required presence, declared top-level types, and unknown
/// names when `additionalProperties` is `false`.
pub(crate) fn validate(schema: &JsonObject, arguments: &JsonObject) -> Result<(), String> {
    for name in required_names(schema) {
        if !arguments.contains_key(name) {
            return Err(format!("missing required parameter '{name}'"));
        }
    }
    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, value) in arguments {
        let Some(property) = properties.and_then(|properties| properties.get(name)) else {
            if closed {
                return Err(format!("unknown parameter '{name}'"));
            }
            continue;
        };
        let types = declared_types(property);
        if !types.is_empty() && !types.iter().any(|ty| matches_type(value, ty)) {
            return Err(format!(
                "parameter '{name}' expects {}, got {value}",
                types.join("|")
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> JsonObject {
        json!({
            "type": "object",
            "properties": {
                "task_name": {"type": "string", "description": "Name of the task"},
                "steps": {"type": "integer", "default": 5},
                "ratio": {"type": ["number", "null"]}
            },
            "required": ["task_name"],
            "additionalProperties": false
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parameters_follow_property_order() {
        let parameters = parameters(&schema());
        assert_eq!(parameters.len(), 3);
        assert_eq!(parameters[0].name, "task_name");
        assert!(parameters[0].required);
        assert_eq!(parameters[0].description.as_deref(), Some("Name of the task"));
        assert_eq!(parameters[1].json_type.as_deref(), Some("integer"));
        assert_eq!(parameters[1].default, Some(json!(5)));
        assert!(!parameters[1].required);
        assert_eq!(parameters[2].json_type.as_deref(), Some("number|null"));
    }

    #[test]
    fn validate_accepts_well_formed_arguments() {
        assert!(validate(&schema(), &args(json!({"task_name": "t", "steps": 3}))).is_ok());
        assert!(validate(&schema(), &args(json!({"task_name": "t", "ratio": null}))).is_ok());
        assert!(validate(&schema(), &args(json!({"task_name": "t", "ratio": 0.5}))).is_ok());
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let missing = validate(&schema(), &args(json!({"steps": 3}))).unwrap_err();
        assert!(missing.contains("task_name"));

        let wrong_type = validate(&schema(), &args(json!({"task_name": "t", "steps": "3"})));
        assert!(wrong_type.unwrap_err().contains("steps"));

        let not_integer = validate(&schema(), &args(json!({"task_name": "t", "steps": 1.5})));
        assert!(not_integer.is_err());

        let unknown = validate(&schema(), &args(json!({"task_name": "t", "extra": 1})));
        assert!(unknown.unwrap_err().contains("extra"));
    }

    #[test]
    fn integral_floats_are_integers() {
        assert!(validate(&schema(), &args(json!({"task_name": "t", "steps": 3.0}))).is_ok());
        assert!(validate(&schema(), &args(json!({"task_name": "t", "steps": -2.0}))).is_ok());
    }

    #[test]
    fn open_schema_allows_unknown_parameters() {
        let mut open = schema();
        open.remove("additionalProperties");
        assert!(validate(&open, &args(json!({"task_name": "t", "extra": 1}))).is_ok());
    }
}
