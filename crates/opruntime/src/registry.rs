//! Operation registry
//!
//! Merges extracted metadata with bound callables into an immutable,
//! lock-free lookup table. The `bind*` adapters build one descriptor per
//! operation at startup — the hot call path is a direct call through the
//! pre-resolved handle, with no type inspection.

use crate::dispatcher::ChunkEmitter;
use crate::marshal::{FromValue, IntoValues, TypeTable};
use futures::future::BoxFuture;
use opcore::{OpResult, OperationError, OperationMetadata, SchemaError, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type HandleFn = Arc<
    dyn Fn(Vec<Value>, ChunkEmitter) -> BoxFuture<'static, Result<Vec<Value>, OperationError>>
        + Send
        + Sync,
>;

/// Pre-resolved invocable descriptor for one operation. Held exclusively
/// by the registry and called only by the dispatcher.
pub struct OperationHandle {
    func: HandleFn,
    in_arity: usize,
    out_arity: usize,
    supports_streaming: bool,
}

impl OperationHandle {
    pub(crate) fn call(
        &self,
        args: Vec<Value>,
        emitter: ChunkEmitter,
    ) -> BoxFuture<'static, Result<Vec<Value>, OperationError>> {
        (self.func)(args, emitter)
    }

    pub fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    pub(crate) fn in_arity(&self) -> usize {
        self.in_arity
    }

    pub(crate) fn out_arity(&self) -> usize {
        self.out_arity
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("in_arity", &self.in_arity)
            .field("out_arity", &self.out_arity)
            .field("supports_streaming", &self.supports_streaming)
            .finish()
    }
}

/// Executable binding input: operation name -> callable, maintained
/// independently of the metadata source and merged at build time.
#[derive(Default)]
pub struct HandleMap {
    handles: HashMap<String, OperationHandle>,
}

macro_rules! bind_impl {
    ($bind:ident, $bind_streaming:ident, $arity:expr, $($arg:ident : $ty:ident),*) => {
        pub fn $bind<$($ty,)* R, F, Fut>(&mut self, name: impl Into<String>, f: F)
        where
            $($ty: FromValue + Send + 'static,)*
            R: IntoValues + Send + 'static,
            F: Fn($($ty),*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = OpResult<R>> + Send + 'static,
        {
            let func: HandleFn = Arc::new(move |args, _emitter| {
                let f = f.clone();
                Box::pin(async move {
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter();
                    $(let $arg = $ty::from_value(args.next().unwrap_or(Value::Null))?;)*
                    Ok(f($($arg),*).await?.into_values())
                })
            });
            self.insert(name.into(), OperationHandle {
                func,
                in_arity: $arity,
                out_arity: R::COUNT,
                supports_streaming: false,
            });
        }

        pub fn $bind_streaming<$($ty,)* R, F, Fut>(&mut self, name: impl Into<String>, f: F)
        where
            $($ty: FromValue + Send + 'static,)*
            R: IntoValues + Send + 'static,
            F: Fn($($ty,)* ChunkEmitter) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = OpResult<R>> + Send + 'static,
        {
            let func: HandleFn = Arc::new(move |args, emitter| {
                let f = f.clone();
                Box::pin(async move {
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.into_iter();
                    $(let $arg = $ty::from_value(args.next().unwrap_or(Value::Null))?;)*
                    Ok(f($($arg,)* emitter).await?.into_values())
                })
            });
            self.insert(name.into(), OperationHandle {
                func,
                in_arity: $arity,
                out_arity: R::COUNT,
                supports_streaming: true,
            });
        }
    };
}

impl HandleMap {
    pub fn new() -> Self {
        Self::default()
    }

    bind_impl!(bind0, bind_streaming0, 0,);
    bind_impl!(bind1, bind_streaming1, 1, a: A);
    bind_impl!(bind2, bind_streaming2, 2, a: A, b: B);
    bind_impl!(bind3, bind_streaming3, 3, a: A, b: B, c: C);

    fn insert(&mut self, name: String, handle: OperationHandle) {
        tracing::debug!("binding operation handle: {}", name);
        self.handles.insert(name, handle);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(|s| s.as_str())
    }

    pub(crate) fn into_inner(self) -> HashMap<String, OperationHandle> {
        self.handles
    }
}

/// One registry slot: metadata plus, when bound and well-formed, the
/// invocable handle.
#[derive(Debug)]
pub struct RegistryEntry {
    pub metadata: OperationMetadata,
    pub(crate) handle: Option<OperationHandle>,
    pub schema_error: Option<SchemaError>,
}

impl RegistryEntry {
    pub fn executable(&self) -> bool {
        self.handle.is_some() && self.schema_error.is_none()
    }

    pub fn streaming(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.supports_streaming())
            .unwrap_or(false)
    }
}

/// Non-fatal findings from a registry build.
#[derive(Debug, Clone)]
pub enum BuildWarning {
    NotExecutable { name: String },
    Undocumented { name: String },
    Schema(SchemaError),
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::NotExecutable { name } => write!(
                f,
                "operation '{}' is discoverable but has no bound implementation",
                name
            ),
            BuildWarning::Undocumented { name } => write!(
                f,
                "operation '{}' is executable but was never discovered; metadata synthesized",
                name
            ),
            BuildWarning::Schema(err) => write!(f, "{}", err),
        }
    }
}

/// Immutable-after-build mapping from operation name to metadata and
/// handle. Safe for unlimited concurrent readers; no writer exists after
/// `build` returns.
pub struct OperationRegistry {
    entries: HashMap<String, RegistryEntry>,
    order: Vec<String>,
    types: TypeTable,
    warnings: Vec<BuildWarning>,
}

impl OperationRegistry {
    /// Merge metadata and callables. Pure and total: mismatches become
    /// warnings or per-operation schema errors, never build failures.
    pub fn build(
        metadata: Vec<OperationMetadata>,
        handles: HandleMap,
        types: TypeTable,
    ) -> Self {
        let mut warnings: Vec<BuildWarning> = types
            .validate()
            .into_iter()
            .map(BuildWarning::Schema)
            .collect();
        let mut handles = handles.into_inner();
        let mut entries: HashMap<String, RegistryEntry> = HashMap::new();
        let mut discovery_order: Vec<String> = Vec::new();

        for meta in metadata {
            if let Some(existing) = entries.get_mut(&meta.name) {
                let err = SchemaError::DuplicateName {
                    name: meta.name.clone(),
                    first: existing.metadata.category.clone(),
                    second: meta.category.clone(),
                };
                warnings.push(BuildWarning::Schema(err.clone()));
                existing.schema_error = Some(err);
                existing.handle = None;
                continue;
            }

            let mut schema_error = None;
            for sig in meta
                .parameters
                .iter()
                .map(|p| &p.ty)
                .chain(meta.returns.iter().map(|r| &r.ty))
            {
                if let Err(err) = types.resolve(&meta.name, sig) {
                    schema_error = Some(err);
                    break;
                }
            }

            let handle = handles.remove(&meta.name);
            if schema_error.is_none() {
                if let Some(h) = &handle {
                    if h.in_arity() != meta.parameters.len()
                        || h.out_arity() != meta.returns.len()
                    {
                        schema_error = Some(SchemaError::ArityMismatch {
                            operation: meta.name.clone(),
                            declared_params: meta.parameters.len(),
                            declared_returns: meta.returns.len(),
                            bound_params: h.in_arity(),
                            bound_returns: h.out_arity(),
                        });
                    }
                }
            }

            if let Some(err) = &schema_error {
                warnings.push(BuildWarning::Schema(err.clone()));
            } else if handle.is_none() {
                warnings.push(BuildWarning::NotExecutable {
                    name: meta.name.clone(),
                });
            }

            let handle = if schema_error.is_some() { None } else { handle };
            discovery_order.push(meta.name.clone());
            entries.insert(
                meta.name.clone(),
                RegistryEntry {
                    metadata: meta,
                    handle,
                    schema_error,
                },
            );
        }

        // Executables discovery never saw stay callable with synthesized
        // metadata. Sorted for a deterministic listing.
        let mut undocumented: Vec<String> = handles.keys().cloned().collect();
        undocumented.sort();
        for name in undocumented {
            if let Some(handle) = handles.remove(&name) {
                warnings.push(BuildWarning::Undocumented { name: name.clone() });
                discovery_order.push(name.clone());
                entries.insert(
                    name.clone(),
                    RegistryEntry {
                        metadata: OperationMetadata::synthesized(name.clone()),
                        handle: Some(handle),
                        schema_error: None,
                    },
                );
            }
        }

        // Listing order: categories in first-appearance order, discovery
        // order within each category.
        let mut category_order: Vec<String> = Vec::new();
        for name in &discovery_order {
            if let Some(entry) = entries.get(name) {
                if !category_order.contains(&entry.metadata.category) {
                    category_order.push(entry.metadata.category.clone());
                }
            }
        }
        let mut order = Vec::with_capacity(discovery_order.len());
        for category in &category_order {
            for name in &discovery_order {
                if entries
                    .get(name)
                    .map(|e| &e.metadata.category == category)
                    .unwrap_or(false)
                {
                    order.push(name.clone());
                }
            }
        }

        Self {
            entries,
            order,
            types,
            warnings,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// Full metadata snapshot, ordered by category then first-discovery
    /// order within category.
    pub fn list(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
