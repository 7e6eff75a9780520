use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single dispatch request. Created per remote call, consumed by one
/// dispatcher invocation, not retained afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub operation: String,
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub streaming: bool,
}

impl ExecutionRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            arguments: HashMap::new(),
            streaming: false,
        }
    }

    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }
}

/// Structured error as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Single (non-streaming) call result: encoded return values keyed by
/// declared return name.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPayload {
    pub values: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResultPayload {
    pub fn ok(values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            values,
            error: None,
        }
    }

    pub fn failed(err: &EngineError) -> Self {
        Self {
            values: HashMap::new(),
            error: Some(ErrorBody::from(err)),
        }
    }
}

/// One element of a streaming call result. Incremental chunks carry
/// `is_last = false`; the terminal chunk carries the encoded return
/// values (or the error that ended the stream) with `is_last = true`.
#[derive(Debug, Clone, Serialize)]
pub struct StreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<serde_json::Value>,
    pub is_last: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl StreamChunk {
    pub fn data(chunk: serde_json::Value) -> Self {
        Self {
            chunk: Some(chunk),
            is_last: false,
            error: None,
        }
    }

    pub fn last(values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            chunk: Some(serde_json::Value::Object(
                values.into_iter().collect(),
            )),
            is_last: true,
            error: None,
        }
    }

    pub fn failed(err: &EngineError) -> Self {
        Self {
            chunk: None,
            is_last: true,
            error: Some(ErrorBody::from(err)),
        }
    }
}
