//! Call dispatch
//!
//! Resolves an operation by name, decodes its arguments, and invokes the
//! bound handle inside a spawned task so that a panicking operation body
//! becomes an `OperationError` instead of taking the process down.
//! Streaming calls run the body as a producer behind a bounded channel
//! with close-on-cancel semantics.

use crate::marshal::{decode_argument, encode, encode_values};
use crate::registry::OperationRegistry;
use chrono::Utc;
use futures::Stream;
use opcore::{
    EngineError, EventBus, ExecutionEvent, ExecutionId, ExecutionRequest, OperationError,
    ResultPayload, ReturnSpec, StreamChunk, Value,
};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Streaming output port handed to operation bodies. Inert for
/// non-streaming invocations: sends are dropped and report `false`.
#[derive(Clone)]
pub struct ChunkEmitter {
    tx: Option<mpsc::Sender<Value>>,
    cancel: CancellationToken,
}

impl ChunkEmitter {
    pub(crate) fn inert() -> Self {
        Self {
            tx: None,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn live(tx: mpsc::Sender<Value>, cancel: CancellationToken) -> Self {
        Self {
            tx: Some(tx),
            cancel,
        }
    }

    /// Send one incremental chunk. Applies backpressure when the consumer
    /// is slow; returns `false` once the stream is inert or closed, so
    /// producers can stop early.
    pub async fn send(&self, value: Value) -> bool {
        match &self.tx {
            Some(tx) => tx.send(value).await.is_ok(),
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Result of one dispatch: a single payload or a live chunk stream.
pub enum ExecutionOutcome {
    Single(ResultPayload),
    Stream(ExecutionStream),
}

/// Ordered chunk sequence of one streaming call. Dropping the stream
/// cancels the producer and closes the intermediary channel.
pub struct ExecutionStream {
    rx: mpsc::Receiver<StreamChunk>,
    cancel: CancellationToken,
}

impl ExecutionStream {
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

impl Stream for ExecutionStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamChunk>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ExecutionStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Looks up, marshals, and invokes operations against an immutable
/// registry.
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    events: Arc<EventBus>,
    stream_buffer_size: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<OperationRegistry>,
        events: Arc<EventBus>,
        stream_buffer_size: usize,
    ) -> Self {
        Self {
            registry,
            events,
            stream_buffer_size: stream_buffer_size.max(1),
        }
    }

    pub async fn invoke(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, EngineError> {
        let execution_id = Uuid::new_v4();

        let entry = self
            .registry
            .lookup(&request.operation)
            .ok_or_else(|| EngineError::NotFound(request.operation.clone()))?;
        if let Some(err) = &entry.schema_error {
            // Excluded when the registry was built; the recorded error is
            // replayed, nothing new is diagnosed at call time.
            return Err(EngineError::Schema(err.clone()));
        }
        let handle = entry.handle.as_ref().ok_or_else(|| {
            EngineError::NotFound(format!(
                "{} (no bound implementation)",
                request.operation
            ))
        })?;

        self.events.emit(ExecutionEvent::OperationStarted {
            execution_id,
            operation: request.operation.clone(),
            streaming: request.streaming,
            timestamp: Utc::now(),
        });
        tracing::debug!("invoking operation {} ({})", request.operation, execution_id);

        let mut decoded = Vec::with_capacity(entry.metadata.parameters.len());
        for spec in &entry.metadata.parameters {
            match decode_argument(self.registry.types(), spec, request.arguments.get(&spec.name))
            {
                Ok(value) => decoded.push(value),
                Err(err) => {
                    let err = EngineError::Argument(err);
                    self.emit_failed(execution_id, &request.operation, &err);
                    return Err(err);
                }
            }
        }

        let started = Instant::now();

        if request.streaming {
            let cancel = CancellationToken::new();
            let (chunk_tx, chunk_rx) = mpsc::channel(self.stream_buffer_size);
            let (value_tx, value_rx) = mpsc::channel(self.stream_buffer_size);
            let emitter = if handle.supports_streaming() {
                ChunkEmitter::live(value_tx, cancel.clone())
            } else {
                // A unary handle degrades to a one-chunk stream: dropping
                // the sender ends the relay's receive loop immediately.
                drop(value_tx);
                ChunkEmitter::inert()
            };
            let producer = tokio::spawn(handle.call(decoded, emitter));
            self.spawn_relay(RelayContext {
                execution_id,
                operation: request.operation.clone(),
                returns: entry.metadata.returns.clone(),
                producer,
                value_rx,
                chunk_tx,
                cancel: cancel.clone(),
                started,
            });
            Ok(ExecutionOutcome::Stream(ExecutionStream {
                rx: chunk_rx,
                cancel,
            }))
        } else {
            let fut = handle.call(decoded, ChunkEmitter::inert());
            let values = match flatten_join(tokio::spawn(fut).await) {
                Ok(values) => values,
                Err(op_err) => {
                    let err = EngineError::Operation(op_err);
                    self.emit_failed(execution_id, &request.operation, &err);
                    return Err(err);
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                "operation {} completed in {}ms",
                request.operation,
                duration_ms
            );
            self.events.emit(ExecutionEvent::OperationCompleted {
                execution_id,
                operation: request.operation.clone(),
                duration_ms,
                timestamp: Utc::now(),
            });
            Ok(ExecutionOutcome::Single(ResultPayload::ok(encode_values(
                &entry.metadata.returns,
                values,
            ))))
        }
    }

    fn emit_failed(&self, execution_id: ExecutionId, operation: &str, err: &EngineError) {
        tracing::warn!("operation {} failed: {}", operation, err);
        self.events.emit(ExecutionEvent::OperationFailed {
            execution_id,
            operation: operation.to_string(),
            error: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Relay loop between the producer task and the consumer stream.
    /// Chunks are forwarded in production order; the producer's final
    /// result (or failure) becomes the terminal chunk.
    fn spawn_relay(&self, ctx: RelayContext) {
        let events = self.events.clone();
        let RelayContext {
            execution_id,
            operation,
            returns,
            mut producer,
            mut value_rx,
            chunk_tx,
            cancel,
            started,
        } = ctx;

        tokio::spawn(async move {
            let mut sequence: u64 = 0;
            loop {
                tokio::select! {
                    received = value_rx.recv() => match received {
                        Some(value) => {
                            sequence += 1;
                            events.emit(ExecutionEvent::ChunkEmitted {
                                execution_id,
                                operation: operation.clone(),
                                sequence,
                                timestamp: Utc::now(),
                            });
                            if chunk_tx.send(StreamChunk::data(encode(&value))).await.is_err() {
                                cancel.cancel();
                                producer.abort();
                                let _ = (&mut producer).await;
                                tracing::debug!(
                                    "stream for operation {} abandoned by consumer",
                                    operation
                                );
                                break;
                            }
                        }
                        // The emitter is gone, so the body has returned
                        // (or panicked); join it for the terminal chunk.
                        None => {
                            match flatten_join((&mut producer).await) {
                                Ok(values) => {
                                    let duration_ms = started.elapsed().as_millis() as u64;
                                    tracing::info!(
                                        "operation {} completed in {}ms ({} chunk(s))",
                                        operation,
                                        duration_ms,
                                        sequence
                                    );
                                    events.emit(ExecutionEvent::OperationCompleted {
                                        execution_id,
                                        operation: operation.clone(),
                                        duration_ms,
                                        timestamp: Utc::now(),
                                    });
                                    let _ = chunk_tx
                                        .send(StreamChunk::last(encode_values(&returns, values)))
                                        .await;
                                }
                                Err(op_err) => {
                                    let err = EngineError::Operation(op_err);
                                    tracing::warn!("operation {} failed: {}", operation, err);
                                    events.emit(ExecutionEvent::OperationFailed {
                                        execution_id,
                                        operation: operation.clone(),
                                        error: err.to_string(),
                                        timestamp: Utc::now(),
                                    });
                                    let _ = chunk_tx.send(StreamChunk::failed(&err)).await;
                                }
                            }
                            break;
                        }
                    },
                    _ = cancel.cancelled() => {
                        producer.abort();
                        let _ = (&mut producer).await;
                        tracing::debug!("stream for operation {} cancelled", operation);
                        break;
                    }
                }
            }
        });
    }
}

struct RelayContext {
    execution_id: ExecutionId,
    operation: String,
    returns: Vec<ReturnSpec>,
    producer: JoinHandle<Result<Vec<Value>, OperationError>>,
    value_rx: mpsc::Receiver<Value>,
    chunk_tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
    started: Instant,
}

fn flatten_join(
    joined: Result<Result<Vec<Value>, OperationError>, JoinError>,
) -> Result<Vec<Value>, OperationError> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(panic_to_error(err)),
    }
}

/// Convert an abnormal termination into a typed error. Only the panic
/// message crosses the isolation boundary.
fn panic_to_error(err: JoinError) -> OperationError {
    if err.is_cancelled() {
        return OperationError::Cancelled;
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&'static str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            OperationError::Panicked(message)
        }
        Err(err) => OperationError::Failed(err.to_string()),
    }
}
