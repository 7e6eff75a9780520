//! Text operations

use opcore::{OpResult, OperationError};
use std::collections::HashMap;

/// Builds a greeting for the given name.
///
/// Display name: Greet
///
/// Parameters:
/// - name: who to greet
///
/// Returns:
/// - greeting: the rendered greeting
pub async fn greet(name: String) -> OpResult<String> {
    Ok(format!("Hello, {}!", name))
}

/// Joins text fragments with an optional separator.
///
/// Display name: Concatenate
///
/// Parameters:
/// - parts: fragments to join, in order
/// - separator: inserted between fragments; defaults to nothing
///
/// Returns:
/// - text: the joined text
pub async fn concat(parts: Vec<String>, separator: Option<String>) -> OpResult<String> {
    let separator = separator.unwrap_or_default();
    Ok(parts.join(&separator))
}

/// Splits text on a separator.
///
/// Display name: Split Text
///
/// Parameters:
/// - text: text to split
/// - separator: boundary to split on
///
/// Returns:
/// - parts: the fragments, in order
pub async fn split(text: String, separator: String) -> OpResult<Vec<String>> {
    if separator.is_empty() {
        return Err(OperationError::Failed(
            "separator must not be empty".to_string(),
        ));
    }
    Ok(text.split(&separator).map(str::to_string).collect())
}

/// Substitutes `{key}` placeholders in a template.
///
/// Display name: Fill Template
///
/// Parameters:
/// - template: text with `{key}` placeholders
/// - values: replacement text per placeholder name
///
/// Returns:
/// - text: the rendered template
pub async fn template_fill(
    template: String,
    values: HashMap<String, String>,
) -> OpResult<String> {
    let mut rendered = template;
    for (key, value) in &values {
        rendered = rendered.replace(&format!("{{{}}}", key), value);
    }
    Ok(rendered)
}
