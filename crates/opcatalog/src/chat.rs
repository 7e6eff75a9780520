//! Prompt assembly operations

use opcore::{OpResult, OperationError, Value};
use opruntime::FromValue;

/// One turn of a chat transcript. Registered as the `ChatMessage`
/// composite type in `composites()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl FromValue for ChatMessage {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        let mut map = match value {
            Value::Map(map) => map,
            other => {
                return Err(OperationError::Failed(format!(
                    "internal argument mismatch: expected ChatMessage value, got {}",
                    other.shape()
                )))
            }
        };
        let role = match map.remove("role") {
            Some(Value::Str(role)) => role,
            _ => {
                return Err(OperationError::Failed(
                    "internal argument mismatch: ChatMessage missing role".to_string(),
                ))
            }
        };
        let content = match map.remove("content") {
            Some(Value::Str(content)) => content,
            _ => {
                return Err(OperationError::Failed(
                    "internal argument mismatch: ChatMessage missing content".to_string(),
                ))
            }
        };
        Ok(Self { role, content })
    }
}

/// Renders a system instruction and a chat transcript into one prompt.
///
/// Display name: Render Prompt
///
/// Parameters:
/// - system: system instruction placed first
/// - messages: transcript turns, in order
///
/// Returns:
/// - prompt: the assembled prompt text
pub async fn render_prompt(system: String, messages: Vec<ChatMessage>) -> OpResult<String> {
    let mut prompt = String::new();
    if !system.is_empty() {
        prompt.push_str("system: ");
        prompt.push_str(&system);
        prompt.push('\n');
    }
    for message in &messages {
        prompt.push_str(&message.role);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    Ok(prompt)
}
