//! JSON data operations

use opcore::{OpResult, OperationError};

/// Re-renders JSON text with pretty indentation.
///
/// Display name: Pretty-print JSON
///
/// Parameters:
/// - json: JSON text to format
///
/// Returns:
/// - formatted: the indented rendering
pub async fn json_pretty(json: String) -> OpResult<String> {
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| OperationError::Failed(format!("JSON parse error: {}", e)))?;
    serde_json::to_string_pretty(&parsed)
        .map_err(|e| OperationError::Failed(format!("JSON stringify error: {}", e)))
}

/// Extracts one value from JSON text by JSON Pointer.
///
/// Display name: Extract JSON Value
///
/// Parameters:
/// - json: JSON text to read
/// - pointer: JSON Pointer to the wanted value, e.g. `/items/0/name`
///
/// Returns:
/// - value: the addressed value, rendered as text
pub async fn json_extract(json: String, pointer: String) -> OpResult<String> {
    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| OperationError::Failed(format!("JSON parse error: {}", e)))?;
    let found = parsed
        .pointer(&pointer)
        .ok_or_else(|| OperationError::Failed(format!("no value at pointer '{}'", pointer)))?;
    Ok(match found {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
