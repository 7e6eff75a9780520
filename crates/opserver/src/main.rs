use actix_cors::Cors;
use actix_web::{
    get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult,
};
use actix_ws::Message;
use futures::StreamExt;
use opcore::{EngineError, ExecutionRequest, ResultPayload};
use opruntime::{ExecutionOutcome, OpRuntime, RegistryEntry, RuntimeConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<OpRuntime>,
}

/// Request body for operation execution
#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    arguments: HashMap<String, serde_json::Value>,
    #[serde(default)]
    streaming: bool,
}

/// One registry entry as the orchestrator sees it: metadata plus the
/// executable and streaming flags.
fn listing_entry(entry: &RegistryEntry) -> serde_json::Value {
    let mut value =
        serde_json::to_value(&entry.metadata).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(object) = value.as_object_mut() {
        object.insert("executable".to_string(), entry.executable().into());
        object.insert("streaming".to_string(), entry.streaming().into());
    }
    value
}

fn error_response(err: &EngineError) -> HttpResponse {
    let payload = ResultPayload::failed(err);
    match err {
        EngineError::NotFound(_) => HttpResponse::NotFound().json(payload),
        EngineError::Argument(_) => HttpResponse::BadRequest().json(payload),
        EngineError::Schema(_) => HttpResponse::UnprocessableEntity().json(payload),
        EngineError::Operation(_) | EngineError::Transport(_) => {
            HttpResponse::InternalServerError().json(payload)
        }
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "opengine"
    }))
}

/// List the full operation catalogue
#[get("/api/operations")]
async fn list_operations(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let listing: Vec<_> = data.runtime.registry().list().map(listing_entry).collect();
    Ok(HttpResponse::Ok().json(listing))
}

/// Describe a single operation
#[get("/api/operations/{name}")]
async fn describe_operation(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    match data.runtime.registry().lookup(&name) {
        Some(entry) => Ok(HttpResponse::Ok().json(listing_entry(entry))),
        None => Ok(error_response(&EngineError::NotFound(name))),
    }
}

/// Execute an operation, single-response or streaming
#[post("/api/operations/{name}/run")]
async fn run_operation(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<RunRequest>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    let body = req.into_inner();

    info!("run {} (streaming: {})", name, body.streaming);

    let request = ExecutionRequest {
        operation: name,
        arguments: body.arguments,
        streaming: body.streaming,
    };

    match data.runtime.invoke(request).await {
        Ok(ExecutionOutcome::Single(payload)) => Ok(HttpResponse::Ok().json(payload)),
        Ok(ExecutionOutcome::Stream(stream)) => {
            // One chunk per NDJSON line, relayed as produced. Dropping
            // the response (client disconnect) drops the stream, which
            // cancels the producer.
            let body = stream.map(|chunk| {
                let mut line = serde_json::to_vec(&chunk).unwrap_or_default();
                line.push(b'\n');
                Ok::<web::Bytes, std::convert::Infallible>(web::Bytes::from(line))
            });
            Ok(HttpResponse::Ok()
                .content_type("application/x-ndjson")
                .streaming(body))
        }
        Err(err) => Ok(error_response(&err)),
    }
}

/// WebSocket endpoint for real-time execution events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    // Subscribe to events
    let mut events = data.runtime.subscribe_events();

    // Spawn task to handle WebSocket
    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                // Receive event from runtime
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            // Serialize and send event
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }

                // Handle incoming WebSocket messages (ping/pong)
                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("🚀 Starting Operation Engine Server");

    // Discover and bind the standard catalogue
    let runtime = opcatalog::runtime(RuntimeConfig::default());

    info!(
        "✅ Runtime initialized with {} operation(s)",
        runtime.registry().len()
    );

    // Create app state
    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_operations)
            .service(describe_operation)
            .service(run_operation)
            .service(websocket_events)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
