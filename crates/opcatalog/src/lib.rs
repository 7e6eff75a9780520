//! Standard operation catalogue
//!
//! One module per category. Each module's own source text (embedded with
//! `include_str!`) is the discovery input; `bindings()` is the executable
//! input; `composites()` registers the structured types the signatures
//! refer to. The engine merges all three at startup. Adding an operation
//! module means adding one entry to each of the three functions below.

pub mod chat;
pub mod data;
pub mod generate;
pub mod math;
pub mod net;
pub mod text;

pub use chat::ChatMessage;

use opcore::{FieldSpec, ModuleSource, TypeSig};
use opruntime::{HandleMap, OpRuntime, RuntimeConfig, TypeTable};

/// Discovery input: every operation module's source with its category.
pub fn sources() -> Vec<ModuleSource> {
    vec![
        ModuleSource::new("math", include_str!("math.rs")),
        ModuleSource::new("text", include_str!("text.rs")),
        ModuleSource::new("data", include_str!("data.rs")),
        ModuleSource::new("chat", include_str!("chat.rs")),
        ModuleSource::new("net", include_str!("net.rs")),
        ModuleSource::new("generate", include_str!("generate.rs")),
    ]
}

/// Executable input: operation name -> callable.
pub fn bindings() -> HandleMap {
    let mut map = HandleMap::new();
    map.bind2("Add", math::add);
    map.bind2("Subtract", math::subtract);
    map.bind2("Multiply", math::multiply);
    map.bind2("Divide", math::divide);
    map.bind1("Greet", text::greet);
    map.bind2("Concat", text::concat);
    map.bind2("Split", text::split);
    map.bind2("TemplateFill", text::template_fill);
    map.bind1("JsonPretty", data::json_pretty);
    map.bind2("JsonExtract", data::json_extract);
    map.bind2("RenderPrompt", chat::render_prompt);
    map.bind1("HttpGet", net::http_get);
    map.bind_streaming2("Complete", generate::complete);
    map
}

/// Composite types referenced by the signatures above.
pub fn composites() -> TypeTable {
    let mut table = TypeTable::new();
    table.register(
        "ChatMessage",
        vec![
            FieldSpec::required("role", TypeSig::Str),
            FieldSpec::required("content", TypeSig::Str),
        ],
    );
    table
}

/// Build a runtime serving the full standard catalogue.
pub fn runtime(config: RuntimeConfig) -> OpRuntime {
    OpRuntime::with_catalog(&sources(), bindings(), composites(), config)
}
