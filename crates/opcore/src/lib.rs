//! Core abstractions for the operation engine
//!
//! This crate provides the fundamental types and errors that all other
//! components depend on. It carries no engine logic of its own.

mod error;
mod events;
mod exec;
mod schema;
mod value;

pub use error::{
    ArgumentError, DiscoveryError, EngineError, OperationError, SchemaError,
};
pub use events::{EventBus, ExecutionEvent, ExecutionId};
pub use exec::{ErrorBody, ExecutionRequest, ResultPayload, StreamChunk};
pub use schema::{
    FieldSpec, ModuleSource, OperationMetadata, ParameterSpec, ReturnSpec, TypeSig,
};
pub use value::Value;

/// Result type for operation bodies
pub type OpResult<T> = std::result::Result<T, OperationError>;

/// Result type for engine calls
pub type Result<T> = std::result::Result<T, EngineError>;
