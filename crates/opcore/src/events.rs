use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted while serving operation calls, for real-time observers
/// (builder UI, CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    OperationStarted {
        execution_id: ExecutionId,
        operation: String,
        streaming: bool,
        timestamp: DateTime<Utc>,
    },
    OperationCompleted {
        execution_id: ExecutionId,
        operation: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    OperationFailed {
        execution_id: ExecutionId,
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ChunkEmitted {
        execution_id: ExecutionId,
        operation: String,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}
