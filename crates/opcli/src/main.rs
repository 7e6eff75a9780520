// crates/opcli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use opcore::{ExecutionEvent, ExecutionRequest};
use opruntime::{ExecutionOutcome, OpRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::io::Write;

#[derive(Parser)]
#[command(name = "ops")]
#[command(about = "Operation Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an operation by name
    Run {
        /// Operation name, e.g. "Add"
        name: String,

        /// Argument as key=value; values parse as JSON with a plain-text fallback
        #[arg(short, long)]
        arg: Vec<String>,

        /// Stream partial results as they are produced
        #[arg(short, long)]
        stream: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Describe one operation's parameters and returns
    Describe {
        /// Operation name
        name: String,
    },

    /// List the operation catalogue
    List,
}

/// Parse `key=value` pairs into an argument bag. Values that parse as
/// JSON are taken as-is, anything else is a plain string.
fn parse_arguments(pairs: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    let mut arguments = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("argument '{}' is not key=value", pair))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        arguments.insert(key.to_string(), value);
    }
    Ok(arguments)
}

fn build_runtime() -> OpRuntime {
    opcatalog::runtime(RuntimeConfig::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            name,
            arg,
            stream,
            verbose,
        } => {
            // Initialize logging
            if verbose {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::DEBUG)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_max_level(tracing::Level::WARN)
                    .init();
            }

            run_operation(name, arg, stream, verbose).await?;
        }

        Commands::Describe { name } => {
            describe_operation(&name);
        }

        Commands::List => {
            list_operations();
        }
    }

    Ok(())
}

async fn run_operation(
    name: String,
    arg: Vec<String>,
    stream: bool,
    verbose: bool,
) -> Result<()> {
    let runtime = build_runtime();
    let arguments = parse_arguments(&arg)?;

    let request = ExecutionRequest {
        operation: name,
        arguments,
        streaming: stream,
    };

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if !verbose {
                continue;
            }
            match event {
                ExecutionEvent::OperationStarted { operation, .. } => {
                    println!("▶️  Started {}", operation);
                }
                ExecutionEvent::ChunkEmitted { sequence, .. } => {
                    println!("  📦 chunk {}", sequence);
                }
                ExecutionEvent::OperationCompleted { duration_ms, .. } => {
                    println!("✅ Completed in {}ms", duration_ms);
                }
                ExecutionEvent::OperationFailed { error, .. } => {
                    println!("❌ Failed: {}", error);
                }
            }
        }
    });

    match runtime.invoke(request).await {
        Ok(ExecutionOutcome::Single(payload)) => {
            println!("📤 Results:");
            for (key, value) in &payload.values {
                println!("   {}: {}", key, value);
            }
        }
        Ok(ExecutionOutcome::Stream(mut stream)) => {
            while let Some(chunk) = stream.next_chunk().await {
                if let Some(err) = &chunk.error {
                    println!();
                    eprintln!("❌ {}: {}", err.kind, err.message);
                    break;
                }
                match chunk.chunk {
                    Some(serde_json::Value::String(token)) if !chunk.is_last => {
                        print!("{}", token);
                        std::io::stdout().flush().ok();
                    }
                    Some(value) if !chunk.is_last => println!("{}", value),
                    Some(serde_json::Value::Object(values)) => {
                        println!();
                        println!("📤 Final:");
                        for (key, value) in values {
                            println!("   {}: {}", key, value);
                        }
                    }
                    Some(value) => {
                        println!();
                        println!("📤 Final: {}", value);
                    }
                    None => {}
                }
                if chunk.is_last {
                    break;
                }
            }
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    Ok(())
}

fn describe_operation(name: &str) {
    let runtime = build_runtime();

    match runtime.registry().lookup(name) {
        Some(entry) => {
            let meta = &entry.metadata;
            println!("📋 {} ({})", meta.display_name, meta.name);
            println!("   Category: {}", meta.category);
            if !meta.documentation.is_empty() {
                println!("   {}", meta.documentation);
            }
            if !entry.executable() {
                println!("   ⚠️  discoverable but not executable");
            }
            if entry.streaming() {
                println!("   Supports streaming");
            }
            println!();
            println!("   Parameters:");
            for param in &meta.parameters {
                let required = if param.required { "" } else { " (optional)" };
                println!(
                    "     • {}: {}{} - {}",
                    param.name, param.ty, required, param.description
                );
            }
            println!("   Returns:");
            for ret in &meta.returns {
                println!("     • {}: {} - {}", ret.name, ret.ty, ret.description);
            }
        }
        None => {
            eprintln!("❌ Unknown operation: {}", name);
            std::process::exit(1);
        }
    }
}

fn list_operations() {
    let runtime = build_runtime();

    println!("📦 Available Operations:");
    println!();

    let mut current_category = String::new();
    for entry in runtime.registry().list() {
        let meta = &entry.metadata;
        if meta.category != current_category {
            current_category = meta.category.clone();
            println!("  [{}]", current_category);
        }
        let marker = if entry.executable() { "•" } else { "○" };
        println!("    {} {} ({})", marker, meta.name, meta.display_name);
        if !meta.documentation.is_empty() {
            println!("      {}", meta.documentation);
        }
    }
}
