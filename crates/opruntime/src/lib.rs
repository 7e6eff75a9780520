//! Operation engine runtime
//!
//! Discovers operation metadata from module source text, merges it with
//! bound callables into an immutable registry, and dispatches calls with
//! argument marshaling, panic isolation, and streaming support.

mod dispatcher;
mod extract;
mod marshal;
mod registry;
mod runtime;

pub use dispatcher::{ChunkEmitter, Dispatcher, ExecutionOutcome, ExecutionStream};
pub use extract::{extract_catalogue, ExtractionOutcome};
pub use marshal::{
    decode, decode_argument, encode, encode_values, FromValue, IntoValue, IntoValues,
    TypeTable,
};
pub use registry::{BuildWarning, HandleMap, OperationHandle, OperationRegistry, RegistryEntry};
pub use runtime::{OpRuntime, RuntimeConfig};
