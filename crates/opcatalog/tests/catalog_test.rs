use opcore::{EngineError, ExecutionRequest, OperationError};
use opruntime::{ExecutionOutcome, OpRuntime, RuntimeConfig};
use serde_json::json;

fn runtime() -> OpRuntime {
    opcatalog::runtime(RuntimeConfig::default())
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

#[tokio::test]
async fn catalogue_discovers_every_bound_operation() {
    let rt = runtime();

    assert!(rt.discovery_errors().is_empty(), "no discovery errors");
    for warning in rt.registry().warnings() {
        panic!("unexpected build warning: {}", warning);
    }

    let add = rt.registry().lookup("Add").expect("Add is discovered");
    assert!(add.executable());
    assert_eq!(add.metadata.category, "math");
    assert_eq!(add.metadata.display_name, "Add Numbers");
    assert_eq!(add.metadata.parameters.len(), 2);

    let complete = rt.registry().lookup("Complete").expect("Complete is discovered");
    assert!(complete.executable());
    assert!(complete.streaming());
    assert_eq!(complete.metadata.parameters.len(), 2);
}

#[tokio::test]
async fn add_sums_loosely_typed_arguments() {
    let rt = runtime();
    let request = ExecutionRequest::new("Add")
        .with_argument("a", json!(2))
        .with_argument("b", json!("40"));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["sum"], json!(42));
}

#[tokio::test]
async fn divide_by_zero_is_an_operation_error() {
    let rt = runtime();
    let request = ExecutionRequest::new("Divide")
        .with_argument("a", json!(1))
        .with_argument("b", json!(0));
    match rt.invoke(request).await {
        Err(EngineError::Operation(OperationError::Failed(message))) => {
            assert!(message.contains("division by zero"));
        }
        other => panic!("expected operation error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn concat_defaults_its_separator() {
    let rt = runtime();
    let request = ExecutionRequest::new("Concat")
        .with_argument("parts", json!(["a", "b", "c"]));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["text"], json!("abc"));

    let request = ExecutionRequest::new("Concat")
        .with_argument("parts", json!(["a", "b", "c"]))
        .with_argument("separator", json!("-"));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["text"], json!("a-b-c"));
}

#[tokio::test]
async fn template_fill_substitutes_placeholders() {
    let rt = runtime();
    let request = ExecutionRequest::new("TemplateFill")
        .with_argument("template", json!("{greeting}, {name}!"))
        .with_argument("values", json!({"greeting": "Hello", "name": "World"}));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["text"], json!("Hello, World!"));
}

#[tokio::test]
async fn json_extract_follows_pointers() {
    let rt = runtime();
    let request = ExecutionRequest::new("JsonExtract")
        .with_argument("json", json!(r#"{"items": [{"name": "first"}]}"#))
        .with_argument("pointer", json!("/items/0/name"));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["value"], json!("first"));
}

#[tokio::test]
async fn render_prompt_accepts_composite_messages() {
    let rt = runtime();
    let request = ExecutionRequest::new("RenderPrompt")
        .with_argument("system", json!("Be brief."))
        .with_argument(
            "messages",
            json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]),
        );
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(
        values["prompt"],
        json!("system: Be brief.\nuser: hi\nassistant: hello\n")
    );
}

#[tokio::test]
async fn render_prompt_rejects_malformed_messages() {
    let rt = runtime();
    let request = ExecutionRequest::new("RenderPrompt")
        .with_argument("system", json!(""))
        .with_argument("messages", json!([{"role": "user"}]));
    match rt.invoke(request).await {
        Err(EngineError::Argument(err)) => {
            assert!(err.to_string().contains("messages"));
        }
        other => panic!("expected argument error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn complete_streams_tokens_then_the_full_text() {
    let rt = runtime();
    let request = ExecutionRequest::new("Complete")
        .with_argument("prompt", json!("one two"))
        .with_argument("max_tokens", json!(3))
        .streaming();

    let mut stream = match rt.invoke(request).await.unwrap() {
        ExecutionOutcome::Stream(stream) => stream,
        ExecutionOutcome::Single(_) => panic!("expected a stream"),
    };

    let mut tokens = Vec::new();
    let mut last = None;
    while let Some(chunk) = stream.next_chunk().await {
        assert!(chunk.error.is_none());
        if chunk.is_last {
            last = chunk.chunk;
            break;
        }
        tokens.push(chunk.chunk.unwrap());
    }

    assert_eq!(tokens, vec![json!("one "), json!("two "), json!("one ")]);
    let last = last.expect("terminal chunk");
    assert_eq!(last["completion"], json!("one two one"));
    assert!(stream.next_chunk().await.is_none());
}

#[tokio::test]
async fn complete_works_without_streaming() {
    let rt = runtime();
    let request = ExecutionRequest::new("Complete")
        .with_argument("prompt", json!("go"))
        .with_argument("max_tokens", json!(2));
    let values = run_single(&rt, request).await.unwrap();
    assert_eq!(values["completion"], json!("go go"));
}
