use opcore::{
    ArgumentError, EngineError, ExecutionRequest, ModuleSource, OperationError, SchemaError,
    Value,
};
use opruntime::{
    extract_catalogue, ChunkEmitter, ExecutionOutcome, HandleMap, OpRuntime,
    OperationRegistry, RuntimeConfig, TypeTable,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MATH_SRC: &str = r#"
/// Adds two integers.
///
/// Display name: Add Numbers
///
/// Parameters:
/// - a: first addend
/// - b: second addend
pub async fn add(a: i64, b: i64) -> OpResult<i64> {
    Ok(a + b)
}
"#;

const TEXT_SRC: &str = r#"
/// Greets someone by name.
pub async fn greet(name: String) -> OpResult<String> {
    Ok(format!("Hello, {}!", name))
}
"#;

fn modules() -> Vec<ModuleSource> {
    vec![
        ModuleSource::new("math", MATH_SRC),
        ModuleSource::new("text", TEXT_SRC),
    ]
}

struct Counters {
    add: Arc<AtomicUsize>,
    greet: Arc<AtomicUsize>,
}

fn handles() -> (HandleMap, Counters) {
    let counters = Counters {
        add: Arc::new(AtomicUsize::new(0)),
        greet: Arc::new(AtomicUsize::new(0)),
    };

    let mut map = HandleMap::new();
    let calls = counters.add.clone();
    map.bind2("Add", move |a: i64, b: i64| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, OperationError>(a + b)
        }
    });
    let calls = counters.greet.clone();
    map.bind1("Greet", move |name: String| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, OperationError>(format!("Hello, {}!", name))
        }
    });

    (map, counters)
}

fn runtime() -> (OpRuntime, Counters) {
    let (map, counters) = handles();
    let rt = OpRuntime::with_catalog(&modules(), map, TypeTable::new(), RuntimeConfig::default());
    (rt, counters)
}

async fn run_single(
    rt: &OpRuntime,
    request: ExecutionRequest,
) -> Result<serde_json::Value, EngineError> {
    match rt.invoke(request).await? {
        ExecutionOutcome::Single(payload) => {
            Ok(serde_json::Value::Object(payload.values.into_iter().collect()))
        }
        ExecutionOutcome::Stream(_) => panic!("expected a single result"),
    }
}

// Scenario A: a registry built from two modules lists exactly their
// exported operations with the declared shapes and display tags.
#[tokio::test]
async fn listing_reflects_both_modules() {
    let (rt, _) = runtime();
    let listed: Vec<_> = rt.registry().list().collect();
    assert_eq!(listed.len(), 2);

    let add = &listed[0];
    assert_eq!(add.metadata.name, "Add");
    assert_eq!(add.metadata.category, "math");
    assert_eq!(add.metadata.display_name, "Add Numbers");
    assert_eq!(add.metadata.parameters.len(), 2);
    assert_eq!(add.metadata.parameters[0].name, "a");
    assert_eq!(add.metadata.parameters[1].name, "b");
    assert_eq!(add.metadata.returns.len(), 1);
    assert_eq!(add.metadata.returns[0].name, "result");

    let greet = &listed[1];
    assert_eq!(greet.metadata.name, "Greet");
    assert_eq!(greet.metadata.category, "text");
    assert_eq!(greet.metadata.display_name, "Greet");
    assert_eq!(greet.metadata.parameters.len(), 1);
    assert_eq!(greet.metadata.returns.len(), 1);
}

// Scenario B: loosely-typed arguments decode against the declared
// signature before the body runs.
#[tokio::test]
async fn add_runs_with_string_encoded_integers() {
    let (rt, counters) = runtime();
    let request = ExecutionRequest::new("Add")
        .with_argument("a", json!("2"))
        .with_argument("b", json!("3"));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["result"], json!(5));
    assert_eq!(counters.add.load(Ordering::SeqCst), 1);
}

// Scenario C: a malformed argument is rejected before invocation.
#[tokio::test]
async fn malformed_argument_short_circuits_before_the_body() {
    let (rt, counters) = runtime();
    let request = ExecutionRequest::new("Add")
        .with_argument("a", json!("x"))
        .with_argument("b", json!("3"));
    match rt.invoke(request).await {
        Err(EngineError::Argument(ArgumentError::Mismatch { parameter, .. })) => {
            assert_eq!(parameter, "a");
        }
        other => panic!("expected argument error, got {:?}", other.err()),
    }
    assert_eq!(counters.add.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_argument_short_circuits_before_the_body() {
    let (rt, counters) = runtime();
    let request = ExecutionRequest::new("Add").with_argument("a", json!(1));
    match rt.invoke(request).await {
        Err(EngineError::Argument(ArgumentError::Missing { parameter })) => {
            assert_eq!(parameter, "b");
        }
        other => panic!("expected argument error, got {:?}", other.err()),
    }
    assert_eq!(counters.add.load(Ordering::SeqCst), 0);
}

// Scenario D: an unknown name never reaches any handle.
#[tokio::test]
async fn unknown_operation_is_not_found() {
    let (rt, counters) = runtime();
    match rt.invoke(ExecutionRequest::new("Missing")).await {
        Err(EngineError::NotFound(name)) => assert_eq!(name, "Missing"),
        other => panic!("expected not-found, got {:?}", other.err()),
    }
    assert_eq!(counters.add.load(Ordering::SeqCst), 0);
    assert_eq!(counters.greet.load(Ordering::SeqCst), 0);
}

// Scenario E / isolation invariant: one panicking call converts to one
// OperationError and neighbouring calls are untouched.
#[tokio::test]
async fn a_panicking_body_does_not_poison_the_dispatcher() {
    const SRC: &str = r#"
/// Fails on its second call.
pub async fn flaky(tag: String) -> OpResult<String> {
    Ok(tag)
}
"#;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut map = HandleMap::new();
    let seen = calls.clone();
    map.bind1("Flaky", move |tag: String| {
        let seen = seen.clone();
        async move {
            if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                panic!("boom on call two");
            }
            Ok::<_, OperationError>(tag)
        }
    });
    let rt = OpRuntime::with_catalog(
        &[ModuleSource::new("flaky", SRC)],
        map,
        TypeTable::new(),
        RuntimeConfig::default(),
    );

    let request = || ExecutionRequest::new("Flaky").with_argument("tag", json!("ok"));

    let first = run_single(&rt, request()).await.unwrap();
    assert_eq!(first["result"], json!("ok"));

    match rt.invoke(request()).await {
        Err(EngineError::Operation(OperationError::Panicked(message))) => {
            assert!(message.contains("boom on call two"));
        }
        other => panic!("expected recovered panic, got {:?}", other.err()),
    }

    let third = run_single(&rt, request()).await.unwrap();
    assert_eq!(third["result"], json!("ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// Streaming order invariant: chunks arrive in production order and only
// the terminal chunk is marked last.
#[tokio::test]
async fn stream_chunks_arrive_in_production_order() {
    const SRC: &str = r#"
/// Counts upward from one.
///
/// Parameters:
/// - upto: how many values to emit
///
/// Returns:
/// - count: how many values were emitted
pub async fn count(upto: i64, emitter: ChunkEmitter) -> OpResult<i64> {
    Ok(upto)
}
"#;
    let mut map = HandleMap::new();
    map.bind_streaming1("Count", |upto: i64, emitter: ChunkEmitter| async move {
        for i in 1..=upto {
            emitter.send(Value::Int(i)).await;
        }
        Ok::<_, OperationError>(upto)
    });
    let rt = OpRuntime::with_catalog(
        &[ModuleSource::new("streams", SRC)],
        map,
        TypeTable::new(),
        RuntimeConfig::default(),
    );

    let request = ExecutionRequest::new("Count")
        .with_argument("upto", json!(5))
        .streaming();
    let mut stream = match rt.invoke(request).await.unwrap() {
        ExecutionOutcome::Stream(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected a stream"),
    };

    let mut seen = Vec::new();
    let mut last = None;
    while let Some(chunk) = stream.next_chunk().await {
        assert!(chunk.error.is_none());
        if chunk.is_last {
            last = chunk.chunk;
            assert!(stream.next_chunk().await.is_none(), "is_last closes the stream");
            break;
        }
        seen.push(chunk.chunk.unwrap());
    }
    assert_eq!(seen, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert_eq!(last.unwrap()["count"], json!(5));
}

// A body that dies mid-stream produces one final error chunk and the
// stream closes rather than hanging.
#[tokio::test]
async fn mid_stream_panic_ends_the_stream_with_one_error_chunk() {
    const SRC: &str = r#"
/// Emits then dies.
pub async fn doomed(emitter: ChunkEmitter) -> OpResult<i64> {
    Ok(0)
}
"#;
    let mut map = HandleMap::new();
    map.bind_streaming0("Doomed", |emitter: ChunkEmitter| async move {
        emitter.send(Value::Int(1)).await;
        if emitter.is_streaming() {
            panic!("stream producer died");
        }
        Ok::<i64, OperationError>(0)
    });
    let rt = OpRuntime::with_catalog(
        &[ModuleSource::new("streams", SRC)],
        map,
        TypeTable::new(),
        RuntimeConfig::default(),
    );

    let mut stream = match rt.invoke(ExecutionRequest::new("Doomed").streaming()).await.unwrap() {
        ExecutionOutcome::Stream(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected a stream"),
    };

    let first = stream.next_chunk().await.unwrap();
    assert_eq!(first.chunk, Some(json!(1)));
    assert!(!first.is_last);

    let second = stream.next_chunk().await.unwrap();
    assert!(second.is_last);
    let error = second.error.expect("error chunk");
    assert_eq!(error.kind, "operation_error");
    assert!(error.message.contains("stream producer died"));

    assert!(stream.next_chunk().await.is_none());
}

// Requesting a stream from a handle without incremental support degrades
// to a single terminal chunk.
#[tokio::test]
async fn unary_handles_degrade_to_a_one_chunk_stream() {
    let (rt, _) = runtime();
    let request = ExecutionRequest::new("Add")
        .with_argument("a", json!(2))
        .with_argument("b", json!(3))
        .streaming();
    let mut stream = match rt.invoke(request).await.unwrap() {
        ExecutionOutcome::Stream(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected a stream"),
    };
    let only = stream.next_chunk().await.unwrap();
    assert!(only.is_last);
    assert_eq!(only.chunk.unwrap()["result"], json!(5));
    assert!(stream.next_chunk().await.is_none());
}

// Dropping the consumer stops the producer instead of leaking it.
#[tokio::test]
async fn abandoned_streams_stop_their_producer() {
    const SRC: &str = r#"
/// Emits forever until told to stop.
pub async fn chatter(emitter: ChunkEmitter) -> OpResult<i64> {
    Ok(0)
}
"#;
    let produced = Arc::new(AtomicUsize::new(0));
    let mut map = HandleMap::new();
    let count = produced.clone();
    map.bind_streaming0("Chatter", move |emitter: ChunkEmitter| {
        let count = count.clone();
        async move {
            let mut n: i64 = 0;
            loop {
                n += 1;
                if !emitter.send(Value::Int(n)).await {
                    return Err::<i64, OperationError>(OperationError::Cancelled);
                }
                count.fetch_add(1, Ordering::SeqCst);
            }
        }
    });
    let rt = OpRuntime::with_catalog(
        &[ModuleSource::new("streams", SRC)],
        map,
        TypeTable::new(),
        RuntimeConfig {
            stream_buffer_size: 2,
            ..RuntimeConfig::default()
        },
    );

    let mut stream = match rt.invoke(ExecutionRequest::new("Chatter").streaming()).await.unwrap() {
        ExecutionOutcome::Stream(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected a stream"),
    };
    for _ in 0..3 {
        assert!(stream.next_chunk().await.is_some());
    }
    drop(stream);

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let settled = produced.load(Ordering::SeqCst);
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    assert_eq!(
        produced.load(Ordering::SeqCst),
        settled,
        "producer kept running after the stream was dropped"
    );
}

// Registry completeness invariant: a bound callable with no discovered
// metadata stays executable under synthesized metadata.
#[tokio::test]
async fn undocumented_executables_stay_executable() {
    let mut map = HandleMap::new();
    map.bind0("Mystery", || async { Ok::<_, OperationError>(7i64) });
    let rt = OpRuntime::with_catalog(&modules(), map, TypeTable::new(), RuntimeConfig::default());

    let entry = rt.registry().lookup("Mystery").expect("registered");
    assert!(entry.executable());
    assert_eq!(entry.metadata.category, "uncategorized");
    assert!(entry.metadata.parameters.is_empty());

    let values = run_single(&rt, ExecutionRequest::new("Mystery")).await.unwrap();
    assert_eq!(values["result"], json!(7));

    assert!(rt
        .registry()
        .warnings()
        .iter()
        .any(|w| w.to_string().contains("Mystery")));
}

// Metadata without a binding is discoverable but not executable, and is
// reported as such.
#[tokio::test]
async fn documented_but_unbound_operations_are_reported() {
    let rt = OpRuntime::with_catalog(
        &modules(),
        HandleMap::new(),
        TypeTable::new(),
        RuntimeConfig::default(),
    );

    let entry = rt.registry().lookup("Add").expect("still listed");
    assert!(!entry.executable());

    match rt.invoke(ExecutionRequest::new("Add")).await {
        Err(EngineError::NotFound(message)) => {
            assert!(message.contains("no bound implementation"));
        }
        other => panic!("expected not-found, got {:?}", other.err()),
    }
    assert_eq!(rt.registry().warnings().len(), 2);
}

// Open-question resolution: the same name in two categories is a
// build-time SchemaError, not a silent pick.
#[tokio::test]
async fn duplicate_names_across_categories_are_schema_errors() {
    let duplicated = vec![
        ModuleSource::new("math", MATH_SRC),
        ModuleSource::new("arithmetic", MATH_SRC),
    ];
    let (map, _) = handles();
    let rt = OpRuntime::with_catalog(&duplicated, map, TypeTable::new(), RuntimeConfig::default());

    let entry = rt.registry().lookup("Add").expect("first discovery listed");
    assert!(!entry.executable());
    assert!(matches!(
        entry.schema_error,
        Some(SchemaError::DuplicateName { .. })
    ));

    match rt.invoke(ExecutionRequest::new("Add")).await {
        Err(EngineError::Schema(SchemaError::DuplicateName { name, first, second })) => {
            assert_eq!(name, "Add");
            assert_eq!(first, "math");
            assert_eq!(second, "arithmetic");
        }
        other => panic!("expected schema error, got {:?}", other.err()),
    }
}

// Unrepresentable signatures fail at build, not at first call.
#[tokio::test]
async fn unknown_declared_types_fail_at_build_time() {
    const SRC: &str = r#"
/// Uses a type nobody registered.
pub async fn render(widget: Widget) -> OpResult<String> {
    Ok(String::new())
}
"#;
    let mut map = HandleMap::new();
    map.bind1("Render", |widget: Value| async move {
        Ok::<_, OperationError>(format!("{:?}", widget))
    });
    let rt = OpRuntime::with_catalog(
        &[ModuleSource::new("ui", SRC)],
        map,
        TypeTable::new(),
        RuntimeConfig::default(),
    );

    let entry = rt.registry().lookup("Render").expect("listed");
    assert!(!entry.executable());
    assert!(matches!(
        entry.schema_error,
        Some(SchemaError::UnknownType { .. })
    ));
}

// Discovery determinism across the whole extraction pass.
#[test]
fn extraction_is_deterministic_across_modules() {
    let first = extract_catalogue(&modules());
    let second = extract_catalogue(&modules());
    assert_eq!(first.metadata, second.metadata);
    assert_eq!(first.errors, second.errors);
}

// A broken module is reported against its category and skipped; the rest
// of the catalogue still builds and serves.
#[tokio::test]
async fn a_broken_module_does_not_abort_discovery() {
    let mut with_broken = modules();
    with_broken.push(ModuleSource::new("broken", "pub async fn oops(a: i64\n"));
    let (map, _) = handles();
    let rt = OpRuntime::with_catalog(&with_broken, map, TypeTable::new(), RuntimeConfig::default());

    assert_eq!(rt.discovery_errors().len(), 1);
    assert_eq!(rt.discovery_errors()[0].category, "broken");

    let request = ExecutionRequest::new("Add")
        .with_argument("a", json!(1))
        .with_argument("b", json!(2));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["result"], json!(3));
}

// Listing order is category-then-discovery and metadata-only entries are
// distinguishable from executable ones.
#[test]
fn listing_orders_by_category_then_discovery() {
    let outcome = extract_catalogue(&modules());
    let (map, _) = handles();
    let registry = OperationRegistry::build(outcome.metadata, map, TypeTable::new());
    let names: Vec<&str> = registry.list().map(|e| e.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["Add", "Greet"]);
    assert!(registry.list().all(|e| e.executable()));
}
