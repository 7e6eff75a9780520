//! Token generation operations
//!
//! Stand-in for a model-backed completion: deterministic, but it streams
//! token by token through the engine's chunk bridge like the real thing.

use opcore::{OpResult, OperationError, Value};
use opruntime::ChunkEmitter;
use tokio::time::{sleep, Duration};

/// Continues a prompt token by token. In streaming mode each token is
/// emitted as its own chunk; the full completion is the final result
/// either way.
///
/// Display name: Complete Text
///
/// Parameters:
/// - prompt: text to continue
/// - max_tokens: number of tokens to produce
///
/// Returns:
/// - completion: the full generated text
pub async fn complete(
    prompt: String,
    max_tokens: i64,
    emitter: ChunkEmitter,
) -> OpResult<String> {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.is_empty() {
        return Err(OperationError::Failed("empty prompt".to_string()));
    }

    let mut produced = String::new();
    for i in 0..max_tokens.max(0) as usize {
        if emitter.is_cancelled() {
            return Err(OperationError::Cancelled);
        }
        let token = format!("{} ", words[i % words.len()]);
        if !emitter.send(Value::Str(token.clone())).await && emitter.is_streaming() {
            // Consumer went away mid-stream.
            return Err(OperationError::Cancelled);
        }
        produced.push_str(&token);
        sleep(Duration::from_millis(5)).await;
    }

    Ok(produced.trim_end().to_string())
}
