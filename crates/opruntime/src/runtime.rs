use crate::dispatcher::{Dispatcher, ExecutionOutcome};
use crate::extract::extract_catalogue;
use crate::marshal::TypeTable;
use crate::registry::{HandleMap, OperationRegistry};
use opcore::{
    DiscoveryError, EngineError, EventBus, ExecutionEvent, ExecutionRequest, ModuleSource,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main runtime: extraction, registry build, and dispatch wired together
/// once at startup.
pub struct OpRuntime {
    registry: Arc<OperationRegistry>,
    dispatcher: Dispatcher,
    event_bus: Arc<EventBus>,
    discovery_errors: Vec<DiscoveryError>,
}

impl OpRuntime {
    /// Build the runtime from a catalogue: module sources for discovery,
    /// a callable map, and the registered composite types. Discovery
    /// errors and build warnings are logged and retained; they never
    /// abort startup.
    pub fn with_catalog(
        modules: &[ModuleSource],
        handles: HandleMap,
        types: TypeTable,
        config: RuntimeConfig,
    ) -> Self {
        let extraction = extract_catalogue(modules);
        for err in &extraction.errors {
            tracing::warn!("discovery: {}", err);
        }

        let registry = Arc::new(OperationRegistry::build(
            extraction.metadata,
            handles,
            types,
        ));
        for warning in registry.warnings() {
            tracing::warn!("registry: {}", warning);
        }
        tracing::info!("registry built with {} operation(s)", registry.len());

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let dispatcher = Dispatcher::new(
            registry.clone(),
            event_bus.clone(),
            config.stream_buffer_size,
        );

        Self {
            registry,
            dispatcher,
            event_bus,
            discovery_errors: extraction.errors,
        }
    }

    /// Get access to the registry for listings and lookups
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Execute one request through the dispatcher
    pub async fn invoke(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.dispatcher.invoke(request).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Non-fatal extraction failures recorded at startup
    pub fn discovery_errors(&self) -> &[DiscoveryError] {
        &self.discovery_errors
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of the per-call chunk channel; a slow consumer applies
    /// backpressure to the producer through this bound.
    pub stream_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stream_buffer_size: 256,
            event_buffer_size: 1000,
        }
    }
}
