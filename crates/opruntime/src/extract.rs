//! Startup metadata extraction
//!
//! Parses the raw source text of each registered operation module and
//! produces an `OperationMetadata` for every exported top-level function.
//! Runs once at startup; the call path never touches source text.

use crate::marshal::default_return_name;
use opcore::{
    DiscoveryError, ModuleSource, OperationMetadata, ParameterSpec, ReturnSpec, TypeSig,
};

/// Result of extracting a whole catalogue. A failed module lands in
/// `errors` without affecting the others.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub metadata: Vec<OperationMetadata>,
    pub errors: Vec<DiscoveryError>,
}

/// Extract operation metadata from every module, in the supplied order.
/// Output order is deterministic: declaration order within a module,
/// module order as given.
pub fn extract_catalogue(modules: &[ModuleSource]) -> ExtractionOutcome {
    let mut metadata = Vec::new();
    let mut errors = Vec::new();

    for module in modules {
        match extract_module(&module.category, &module.source) {
            Ok(mut ops) => metadata.append(&mut ops),
            Err(message) => errors.push(DiscoveryError {
                category: module.category.clone(),
                message,
            }),
        }
    }

    ExtractionOutcome { metadata, errors }
}

fn extract_module(category: &str, source: &str) -> Result<Vec<OperationMetadata>, String> {
    let lines: Vec<&str> = source.lines().collect();
    let mut ops = Vec::new();
    let mut doc: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(text) = line.strip_prefix("///") {
            doc.push(text.strip_prefix(' ').unwrap_or(text).to_string());
            i += 1;
            continue;
        }
        // Attributes may sit between the doc block and the signature.
        if line.starts_with("#[") {
            i += 1;
            continue;
        }
        // Exported-name convention: only top-level `pub fn` items are
        // operations. Private helpers and impl-block methods (indented)
        // are invisible to discovery.
        if line.starts_with("pub fn ") || line.starts_with("pub async fn ") {
            let (signature, consumed) = collect_signature(&lines[i..])
                .ok_or_else(|| format!("unterminated signature at line {}", i + 1))?;
            let op = parse_operation(category, &signature, &doc)
                .map_err(|e| format!("{} (line {})", e, i + 1))?;
            ops.push(op);
            doc.clear();
            i += consumed;
            continue;
        }

        doc.clear();
        i += 1;
    }

    Ok(ops)
}

/// Join signature lines up to the body brace (or a trailing semicolon).
fn collect_signature(lines: &[&str]) -> Option<(String, usize)> {
    let mut signature = String::new();
    for (n, line) in lines.iter().enumerate() {
        if let Some(pos) = line.find('{').or_else(|| line.find(';')) {
            signature.push_str(&line[..pos]);
            return Some((signature, n + 1));
        }
        signature.push_str(line);
        signature.push(' ');
    }
    None
}

fn parse_operation(
    category: &str,
    signature: &str,
    doc_lines: &[String],
) -> Result<OperationMetadata, String> {
    let after_fn = signature
        .split("fn ")
        .nth(1)
        .ok_or_else(|| "missing fn keyword".to_string())?;
    let open = after_fn
        .find('(')
        .ok_or_else(|| "missing parameter list".to_string())?;
    let fn_name = after_fn[..open].trim();
    if fn_name.is_empty()
        || !fn_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(format!("malformed function name '{}'", fn_name));
    }

    let close = matching_paren(after_fn, open)
        .ok_or_else(|| format!("unbalanced parameter list for '{}'", fn_name))?;
    let params_text = &after_fn[open + 1..close];
    let rest = &after_fn[close + 1..];

    let doc = parse_doc(doc_lines);
    let name = operation_name(fn_name);

    let mut parameters = Vec::new();
    for piece in split_top_level(params_text) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (param_name, token) = piece
            .split_once(':')
            .ok_or_else(|| format!("malformed parameter '{}' in '{}'", piece, fn_name))?;
        let param_name = param_name.trim().trim_start_matches("mut ").trim();
        let token = token.trim();
        // The streaming output port is engine-supplied, never declared.
        if token == "ChunkEmitter" || token == "&ChunkEmitter" {
            continue;
        }
        let (token, required) = match strip_generic(token, "Option") {
            Some(inner) => (inner.trim(), false),
            None => (token, true),
        };
        let ty = parse_type_token(token)?;
        let description = doc
            .params
            .iter()
            .find(|(n, _)| n == param_name)
            .map(|(_, d)| d.clone())
            .unwrap_or_default();
        parameters.push(ParameterSpec {
            name: param_name.to_string(),
            ty,
            description,
            required,
        });
    }

    let mut returns = Vec::new();
    if let Some(ret_text) = rest.split("->").nth(1) {
        let ret_text = ret_text.trim();
        let inner = strip_generic(ret_text, "OpResult").unwrap_or(ret_text).trim();
        let tokens: Vec<String> = if inner == "()" || inner.is_empty() {
            Vec::new()
        } else if inner.starts_with('(') && inner.ends_with(')') {
            split_top_level(&inner[1..inner.len() - 1])
        } else {
            vec![inner.to_string()]
        };
        for (i, token) in tokens.iter().enumerate() {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let ty = parse_type_token(token)?;
            let (ret_name, description) = doc
                .returns
                .get(i)
                .cloned()
                .unwrap_or_else(|| (default_return_name(i), String::new()));
            returns.push(ReturnSpec {
                name: ret_name,
                ty,
                description,
            });
        }
    }

    Ok(OperationMetadata {
        display_name: doc.display.unwrap_or_else(|| name.clone()),
        name,
        category: category.to_string(),
        parameters,
        returns,
        documentation: doc.documentation,
    })
}

/// Map a source type token to its declared signature. Bare idents that
/// are not built-ins parse as `Named` and are judged at registry build,
/// not here.
fn parse_type_token(token: &str) -> Result<TypeSig, String> {
    let token = token.trim().trim_start_matches('&').trim();

    match token {
        "i64" | "i32" | "u32" | "u64" | "usize" => return Ok(TypeSig::Int),
        "f64" | "f32" => return Ok(TypeSig::Float),
        "String" | "str" => return Ok(TypeSig::Str),
        "bool" => return Ok(TypeSig::Bool),
        _ => {}
    }

    if let Some(inner) = strip_generic(token, "Vec") {
        return Ok(TypeSig::List(Box::new(parse_type_token(inner)?)));
    }
    if let Some(inner) =
        strip_generic(token, "HashMap").or_else(|| strip_generic(token, "BTreeMap"))
    {
        let parts = split_top_level(inner);
        if parts.len() != 2 || parts[0].trim() != "String" {
            return Err(format!("unsupported map type '{}'", token));
        }
        return Ok(TypeSig::Map(Box::new(parse_type_token(&parts[1])?)));
    }
    if !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Ok(TypeSig::Named(token.to_string()));
    }

    Err(format!("unparseable type token '{}'", token))
}

/// `Widget<inner>` -> `inner`, for a specific wrapper name.
fn strip_generic<'a>(token: &'a str, wrapper: &str) -> Option<&'a str> {
    token
        .strip_prefix(wrapper)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        if i < open {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas at angle/paren depth zero.
fn split_top_level(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                pieces.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}

/// `json_parse` -> `JsonParse`: the published operation name.
fn operation_name(fn_name: &str) -> String {
    fn_name
        .split('_')
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

struct DocBlock {
    display: Option<String>,
    documentation: String,
    params: Vec<(String, String)>,
    returns: Vec<(String, String)>,
}

fn parse_doc(lines: &[String]) -> DocBlock {
    enum Section {
        Free,
        Params,
        Returns,
    }

    let mut display = None;
    let mut free: Vec<String> = Vec::new();
    let mut params = Vec::new();
    let mut returns = Vec::new();
    let mut section = Section::Free;

    for line in lines {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Display name:") {
            display = Some(rest.trim().to_string());
            continue;
        }
        if trimmed == "Parameters:" {
            section = Section::Params;
            continue;
        }
        if trimmed == "Returns:" {
            section = Section::Returns;
            continue;
        }
        if let Some(item) = trimmed.strip_prefix("- ") {
            match section {
                Section::Params => {
                    params.push(split_item(item));
                    continue;
                }
                Section::Returns => {
                    returns.push(split_item(item));
                    continue;
                }
                Section::Free => {}
            }
        }
        if matches!(section, Section::Free) && !trimmed.is_empty() {
            free.push(trimmed.to_string());
        }
    }

    DocBlock {
        display,
        documentation: free.join(" "),
        params,
        returns,
    }
}

fn split_item(item: &str) -> (String, String) {
    match item.split_once(':') {
        Some((name, description)) => (name.trim().to_string(), description.trim().to_string()),
        None => (item.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcore::ModuleSource;

    const MATH_SRC: &str = r#"
use opcore::OpResult;

/// Adds two integers.
///
/// Display name: Add Numbers
///
/// Parameters:
/// - a: first addend
/// - b: second addend
///
/// Returns:
/// - sum: arithmetic sum of the inputs
pub async fn add(a: i64, b: i64) -> OpResult<i64> {
    Ok(a + b)
}

fn helper(x: i64) -> i64 {
    x
}

/// Divides without any doc sections.
pub async fn divide(a: i64, b: i64) -> OpResult<i64> {
    Ok(a / b)
}
"#;

    fn modules() -> Vec<ModuleSource> {
        vec![ModuleSource::new("math", MATH_SRC)]
    }

    #[test]
    fn extracts_exported_functions_only() {
        let outcome = extract_catalogue(&modules());
        assert!(outcome.errors.is_empty());
        let names: Vec<&str> = outcome.metadata.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Add", "Divide"]);
    }

    #[test]
    fn cross_references_doc_sections() {
        let outcome = extract_catalogue(&modules());
        let add = &outcome.metadata[0];
        assert_eq!(add.display_name, "Add Numbers");
        assert_eq!(add.documentation, "Adds two integers.");
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.parameters[0].name, "a");
        assert_eq!(add.parameters[0].ty, TypeSig::Int);
        assert_eq!(add.parameters[0].description, "first addend");
        assert!(add.parameters[0].required);
        assert_eq!(add.returns.len(), 1);
        assert_eq!(add.returns[0].name, "sum");
    }

    #[test]
    fn tolerates_missing_documentation() {
        let outcome = extract_catalogue(&modules());
        let divide = &outcome.metadata[1];
        assert_eq!(divide.display_name, "Divide");
        assert_eq!(divide.parameters[0].description, "");
        assert_eq!(divide.returns[0].name, "result");
    }

    #[test]
    fn extraction_is_deterministic() {
        let first = extract_catalogue(&modules());
        let second = extract_catalogue(&modules());
        assert_eq!(first.metadata, second.metadata);
    }

    #[test]
    fn option_parameters_are_not_required() {
        let src = "pub async fn concat(parts: Vec<String>, separator: Option<String>) -> OpResult<String> {\n}\n";
        let outcome = extract_catalogue(&[ModuleSource::new("text", src)]);
        let meta = &outcome.metadata[0];
        assert_eq!(meta.name, "Concat");
        assert_eq!(meta.parameters[0].ty, TypeSig::List(Box::new(TypeSig::Str)));
        assert!(meta.parameters[0].required);
        assert_eq!(meta.parameters[1].ty, TypeSig::Str);
        assert!(!meta.parameters[1].required);
    }

    #[test]
    fn emitter_parameter_is_engine_supplied() {
        let src = "pub async fn complete(prompt: String, max_tokens: i64, emitter: ChunkEmitter) -> OpResult<String> {\n}\n";
        let outcome = extract_catalogue(&[ModuleSource::new("generate", src)]);
        let meta = &outcome.metadata[0];
        assert_eq!(meta.parameters.len(), 2);
        assert_eq!(meta.parameters[1].name, "max_tokens");
    }

    #[test]
    fn tuple_returns_flatten_in_order() {
        let src = r#"
/// Returns:
/// - status: response status code
/// - body: response body text
pub async fn http_get(url: String) -> OpResult<(i64, String)> {
}
"#;
        let outcome = extract_catalogue(&[ModuleSource::new("net", src)]);
        let meta = &outcome.metadata[0];
        assert_eq!(meta.returns.len(), 2);
        assert_eq!(meta.returns[0].name, "status");
        assert_eq!(meta.returns[0].ty, TypeSig::Int);
        assert_eq!(meta.returns[1].name, "body");
        assert_eq!(meta.returns[1].ty, TypeSig::Str);
    }

    #[test]
    fn unknown_idents_parse_as_named_types() {
        let src = "pub async fn render(messages: Vec<ChatMessage>) -> OpResult<String> {\n}\n";
        let outcome = extract_catalogue(&[ModuleSource::new("chat", src)]);
        let meta = &outcome.metadata[0];
        assert_eq!(
            meta.parameters[0].ty,
            TypeSig::List(Box::new(TypeSig::Named("ChatMessage".to_string())))
        );
    }

    #[test]
    fn broken_module_fails_alone() {
        let broken = "pub async fn oops(a: i64\n";
        let outcome = extract_catalogue(&[
            ModuleSource::new("bad", broken),
            ModuleSource::new("math", MATH_SRC),
        ]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].category, "bad");
        assert_eq!(outcome.metadata.len(), 2);
    }
}
