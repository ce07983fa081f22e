use serde_json::Value;

use super::{CallToolResult, Content, RawContent, ResourceContents};

fn content_value(content: Content) -> Value {
    match content.raw {
        RawContent::Text(text) => Value::String(text.text),
        RawContent::Image(image) => Value::String(image.data),
        RawContent::Audio(audio) => Value::String(audio.raw.data),
        RawContent::Resource(embedded) => match embedded.resource {
            ResourceContents::TextResourceContents { text, .. } => Value::String(text),
            ResourceContents::BlobResourceContents { .. } => Value::Null,
        },
        RawContent::ResourceLink(link) => Value::String(link.uri),
    }
}

/// The output value of a call, or the tool's error message.
///
/// Structured content wins over plain content. A structured object whose only key is
/// `result` is unwrapped.
pub(crate) fn into_output(result: CallToolResult) -> Result<Value, String> {
    let CallToolResult {
        content,
        structured_content,
        is_error,
        ..
    } = result;
    let content: Option<Vec<Content>> = content.into();
    let mut content = content.unwrap_or_default();
    if is_error.unwrap_or(false) {
        return Err(content
            .iter()
            .find_map(|item| item.as_text().map(|text| text.text.clone()))
            .unwrap_or_else(|| "tool returned an error without a message".to_owned()));
    }
    match structured_content {
        Some(Value::Object(mut object)) if object.len() == 1 && object.contains_key("result") => {
            Ok(object.remove("result").unwrap_or_default())
        }
        Some(structured) => Ok(structured),
        None if content.is_empty() => Ok(Value::Null),
        None => Ok(content_value(content.swap_remove(0))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn result(value: Value) -> CallToolResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn error_takes_first_text() {
        let failed = CallToolResult::error(vec![Content::text("division by zero")]);
        assert_eq!(into_output(failed).unwrap_err(), "division by zero");
    }

    #[test]
    fn structured_result_is_unwrapped() {
        assert_eq!(
            into_output(CallToolResult::structured(json!({"result": 3}))),
            Ok(json!(3))
        );
        assert_eq!(
            into_output(CallToolResult::structured(json!({"sum": 3, "count": 2}))),
            Ok(json!({"sum": 3, "count": 2}))
        );
    }

    #[test]
    fn first_content_item_is_used() {
        let text = result(json!({
            "content": [
                {"type": "text", "text": "3"},
                {"type": "text", "text": "ignored"}
            ],
            "isError": false
        }));
        assert_eq!(into_output(text), Ok(json!("3")));

        let image = result(json!({
            "content": [{"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"}]
        }));
        assert_eq!(into_output(image), Ok(json!("aGVsbG8=")));

        let resource = result(json!({
            "content": [{
                "type": "resource",
                "resource": {"uri": "file:///a.txt", "text": "contents"}
            }]
        }));
        assert_eq!(into_output(resource), Ok(json!("contents")));

        let link = result(json!({
            "content": [{"type": "resource_link", "uri": "file:///a.txt", "name": "a"}]
        }));
        assert_eq!(into_output(link), Ok(json!("file:///a.txt")));
    }

    #[test]
    fn empty_content_is_null() {
        assert_eq!(into_output(CallToolResult::success(Vec::new())), Ok(Value::Null));
    }
}
