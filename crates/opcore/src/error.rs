use thiserror::Error;

/// Non-fatal extraction failure, scoped to a single module. Discovery of
/// all other modules continues.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("discovery failed for category '{category}': {message}")]
pub struct DiscoveryError {
    pub category: String,
    pub message: String,
}

/// Unrepresentable declared signature, surfaced at registry build time.
/// The offending operation becomes non-executable; the build continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("operation '{operation}' declares unknown type '{type_name}'")]
    UnknownType { operation: String, type_name: String },

    #[error("operation '{name}' discovered in both '{first}' and '{second}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    #[error(
        "operation '{operation}' declares {declared_params} parameter(s) and \
         {declared_returns} return(s) but its handle binds {bound_params}/{bound_returns}"
    )]
    ArityMismatch {
        operation: String,
        declared_params: usize,
        declared_returns: usize,
        bound_params: usize,
        bound_returns: usize,
    },

    #[error("composite type '{type_name}' field '{field}' has unknown type '{inner}'")]
    UnknownFieldType {
        type_name: String,
        field: String,
        inner: String,
    },
}

/// Malformed or missing caller argument, returned before the operation
/// body runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("missing required argument '{parameter}'")]
    Missing { parameter: String },

    #[error("invalid value for '{parameter}': expected {expected}, got {actual}")]
    Mismatch {
        parameter: String,
        expected: String,
        actual: String,
    },
}

/// Failure raised by an operation body, including recovered panics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Error taxonomy at the call boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("operation not found: {0}")]
    NotFound(String),

    #[error("argument error: {0}")]
    Argument(#[from] ArgumentError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("transport fault: {0}")]
    Transport(String),
}

impl EngineError {
    /// Stable machine-readable kind for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Argument(_) => "argument_error",
            EngineError::Schema(_) => "schema_error",
            EngineError::Operation(_) => "operation_error",
            EngineError::Transport(_) => "transport_fault",
        }
    }
}
