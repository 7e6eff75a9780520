//! Argument marshaling
//!
//! Converts caller-supplied encoded values into typed `Value`s per the
//! declared signature, and encodes results back. Scalar decoding is
//! deliberately loose (numeric strings decode as numbers); structural
//! decoding is strict. `encode` is the exact inverse of `decode` for
//! every supported signature.

use opcore::{ArgumentError, FieldSpec, OperationError, ParameterSpec, ReturnSpec, SchemaError, TypeSig, Value};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Registered composite (structured) types, keyed by name. Field layouts
/// are known ahead of time; unknown names are rejected at registry build.
#[derive(Debug, Default)]
pub struct TypeTable {
    types: HashMap<String, Vec<FieldSpec>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, fields: Vec<FieldSpec>) {
        self.types.insert(name.into(), fields);
    }

    pub fn fields(&self, name: &str) -> Option<&[FieldSpec]> {
        self.types.get(name).map(|f| f.as_slice())
    }

    /// Fail fast on a signature the marshaler cannot represent.
    pub fn resolve(&self, operation: &str, sig: &TypeSig) -> Result<(), SchemaError> {
        match sig {
            TypeSig::List(inner) | TypeSig::Map(inner) => self.resolve(operation, inner),
            TypeSig::Named(name) if !self.types.contains_key(name) => {
                Err(SchemaError::UnknownType {
                    operation: operation.to_string(),
                    type_name: name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Check the table's own field layouts for dangling type references.
    pub fn validate(&self) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();
        for name in names {
            for field in &self.types[name] {
                if let Some(unknown) = self.first_unknown(&field.ty) {
                    errors.push(SchemaError::UnknownFieldType {
                        type_name: name.clone(),
                        field: field.name.clone(),
                        inner: unknown.to_string(),
                    });
                }
            }
        }
        errors
    }

    fn first_unknown<'a>(&self, sig: &'a TypeSig) -> Option<&'a str> {
        match sig {
            TypeSig::List(inner) | TypeSig::Map(inner) => self.first_unknown(inner),
            TypeSig::Named(name) if !self.types.contains_key(name) => Some(name),
            _ => None,
        }
    }
}

/// Shape-level decode failure, before it is attached to a parameter name.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMismatch {
    pub expected: String,
    pub actual: String,
}

impl ShapeMismatch {
    fn new(sig: &TypeSig, raw: &JsonValue) -> Self {
        Self {
            expected: sig.to_string(),
            actual: describe(raw),
        }
    }
}

fn describe(raw: &JsonValue) -> String {
    match raw {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => format!("bool {}", b),
        JsonValue::Number(n) => format!("number {}", n),
        JsonValue::String(s) if s.len() <= 32 => format!("string \"{}\"", s),
        JsonValue::String(_) => "string".to_string(),
        JsonValue::Array(_) => "array".to_string(),
        JsonValue::Object(_) => "object".to_string(),
    }
}

/// Decode one encoded value against its declared signature.
pub fn decode(
    table: &TypeTable,
    sig: &TypeSig,
    raw: &JsonValue,
) -> Result<Value, ShapeMismatch> {
    match sig {
        TypeSig::Str => match raw {
            JsonValue::String(s) => Ok(Value::Str(s.clone())),
            _ => Err(ShapeMismatch::new(sig, raw)),
        },
        TypeSig::Int => decode_int(raw).ok_or_else(|| ShapeMismatch::new(sig, raw)),
        TypeSig::Float => decode_float(raw).ok_or_else(|| ShapeMismatch::new(sig, raw)),
        TypeSig::Bool => match raw {
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::String(s) if s == "true" => Ok(Value::Bool(true)),
            JsonValue::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(ShapeMismatch::new(sig, raw)),
        },
        TypeSig::List(inner) => match raw {
            JsonValue::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let value = decode(table, inner, item).map_err(|m| ShapeMismatch {
                        expected: sig.to_string(),
                        actual: format!("array with invalid element at index {}: {}", i, m.actual),
                    })?;
                    decoded.push(value);
                }
                Ok(Value::List(decoded))
            }
            _ => Err(ShapeMismatch::new(sig, raw)),
        },
        TypeSig::Map(inner) => match raw {
            JsonValue::Object(entries) => {
                let mut decoded = HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let value = decode(table, inner, item).map_err(|m| ShapeMismatch {
                        expected: sig.to_string(),
                        actual: format!("object with invalid entry '{}': {}", key, m.actual),
                    })?;
                    decoded.insert(key.clone(), value);
                }
                Ok(Value::Map(decoded))
            }
            _ => Err(ShapeMismatch::new(sig, raw)),
        },
        TypeSig::Named(name) => {
            let fields = table.fields(name).ok_or_else(|| ShapeMismatch {
                expected: name.clone(),
                actual: "unregistered composite type".to_string(),
            })?;
            let entries = match raw {
                JsonValue::Object(entries) => entries,
                _ => return Err(ShapeMismatch::new(sig, raw)),
            };
            let mut decoded = HashMap::with_capacity(fields.len());
            for field in fields {
                match entries.get(&field.name) {
                    Some(item) => {
                        let value =
                            decode(table, &field.ty, item).map_err(|m| ShapeMismatch {
                                expected: sig.to_string(),
                                actual: format!(
                                    "object with invalid field '{}': {}",
                                    field.name, m.actual
                                ),
                            })?;
                        decoded.insert(field.name.clone(), value);
                    }
                    None if field.required => {
                        return Err(ShapeMismatch {
                            expected: sig.to_string(),
                            actual: format!("object missing field '{}'", field.name),
                        });
                    }
                    None => {}
                }
            }
            Ok(Value::Map(decoded))
        }
    }
}

fn decode_int(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Value::Int(i));
            }
            let f = n.as_f64()?;
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                return Some(Value::Int(f as i64));
            }
            None
        }
        JsonValue::String(s) => s.trim().parse::<i64>().ok().map(Value::Int),
        _ => None,
    }
}

fn decode_float(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Number(n) => n.as_f64().map(Value::Float),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().map(Value::Float),
        _ => None,
    }
}

/// Decode one declared parameter from the caller's argument bag.
pub fn decode_argument(
    table: &TypeTable,
    spec: &ParameterSpec,
    raw: Option<&JsonValue>,
) -> Result<Value, ArgumentError> {
    match raw {
        None | Some(JsonValue::Null) => {
            if spec.required {
                Err(ArgumentError::Missing {
                    parameter: spec.name.clone(),
                })
            } else {
                Ok(Value::Null)
            }
        }
        Some(raw) => decode(table, &spec.ty, raw).map_err(|m| ArgumentError::Mismatch {
            parameter: spec.name.clone(),
            expected: m.expected,
            actual: m.actual,
        }),
    }
}

/// Encode one typed value. Exact structural inverse of `decode`.
pub fn encode(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::from(*n),
        Value::Float(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::List(items) => JsonValue::Array(items.iter().map(encode).collect()),
        Value::Map(map) => JsonValue::Object(
            map.iter().map(|(k, v)| (k.clone(), encode(v))).collect(),
        ),
    }
}

/// Zip returned values with the declared return names. Undeclared
/// positions fall back to synthesized names so no value is dropped.
pub fn encode_values(
    returns: &[ReturnSpec],
    values: Vec<Value>,
) -> HashMap<String, JsonValue> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let name = returns
                .get(i)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| default_return_name(i));
            (name, encode(&value))
        })
        .collect()
}

pub(crate) fn default_return_name(index: usize) -> String {
    if index == 0 {
        "result".to_string()
    } else {
        format!("result{}", index + 1)
    }
}

fn conversion_err(expected: &str, got: &Value) -> OperationError {
    OperationError::Failed(format!(
        "internal argument mismatch: expected {} value, got {}",
        expected,
        got.shape()
    ))
}

/// Conversion from a decoded `Value` into the concrete type an operation
/// body takes. Decoding has already validated the shape, so a failure
/// here means the binding disagrees with the declared signature.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, OperationError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(conversion_err("int", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Float(n) => Ok(n),
            Value::Int(n) => Ok(n as f64),
            other => Err(conversion_err("float", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(conversion_err("string", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(conversion_err("bool", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(conversion_err("list", &other)),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, T::from_value(v)?)))
                .collect(),
            other => Err(conversion_err("map", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, OperationError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Conversion from an operation body's concrete result back to a `Value`.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (k, v.into_value()))
                .collect(),
        )
    }
}

/// Ordered result tuple of an operation body, one `Value` per declared
/// return.
pub trait IntoValues {
    const COUNT: usize;
    fn into_values(self) -> Vec<Value>;
}

// A blanket impl over `T: IntoValue` would collide with the tuple impls
// under coherence, so the single-return forms are spelled out.
macro_rules! single_return {
    ($($ty:ty),*) => {
        $(
            impl IntoValues for $ty {
                const COUNT: usize = 1;
                fn into_values(self) -> Vec<Value> {
                    vec![self.into_value()]
                }
            }
        )*
    };
}

single_return!(Value, i64, f64, String, bool);

impl<T: IntoValue> IntoValues for Vec<T> {
    const COUNT: usize = 1;
    fn into_values(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<T: IntoValue> IntoValues for HashMap<String, T> {
    const COUNT: usize = 1;
    fn into_values(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<A: IntoValue, B: IntoValue> IntoValues for (A, B) {
    const COUNT: usize = 2;
    fn into_values(self) -> Vec<Value> {
        vec![self.0.into_value(), self.1.into_value()]
    }
}

impl<A: IntoValue, B: IntoValue, C: IntoValue> IntoValues for (A, B, C) {
    const COUNT: usize = 3;
    fn into_values(self) -> Vec<Value> {
        vec![self.0.into_value(), self.1.into_value(), self.2.into_value()]
    }
}
