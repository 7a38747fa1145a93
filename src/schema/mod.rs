//! Schema engine & parameter model (§4.5).
//!
//! `ParamDef` is an explicit, inspectable schema value (a tagged variant)
//! rather than anything derived through runtime reflection over a validator
//! library, per the DESIGN NOTES re-architecture of "arbitrary runtime
//! reflection to inspect validator metadata". It is reused as both the
//! inbound parameter schema (`ParamSpec` on a tool's actions) and the
//! presenter's declared output schema (§4.4): both are "declare typed
//! fields, emit JSON Schema, validate a JSON value" problems.

use indexmap::IndexMap;
use serde_json::{Map, Value};


/// Primitive parameter/field type, tagged over the closed set spec.md
/// allows: string, number, boolean, enum, array-of-primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    /// `integer: true` is a display/coercion hint only — field compatibility
    /// normalises integer and number to the same base type (§4.5).
    Number {
        integer: bool,
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Enum(Vec<String>),
    Array {
        item: Box<ParamType>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
}

impl ParamType {
    pub fn string() -> Self {
        ParamType::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn number() -> Self {
        ParamType::Number {
            integer: false,
            min: None,
            max: None,
        }
    }

    pub fn integer() -> Self {
        ParamType::Number {
            integer: true,
            min: None,
            max: None,
        }
    }

    pub fn boolean() -> Self {
        ParamType::Boolean
    }

    pub fn enum_of(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        ParamType::Enum(values.into_iter().map(Into::into).collect())
    }

    pub fn array_of(item: ParamType) -> Self {
        ParamType::Array {
            item: Box::new(item),
            min_items: None,
            max_items: None,
        }
    }

    /// Base-type name, used by field compatibility (`integer` ≈ `number`).
    fn base_name(&self) -> &'static str {
        match self {
            ParamType::String { .. } => "string",
            ParamType::Number { .. } => "number",
            ParamType::Boolean => "boolean",
            ParamType::Enum(_) => "enum",
            ParamType::Array { .. } => "array",
        }
    }
}

/// A single parameter/field declaration.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub ty: ParamType,
    pub optional: bool,
    pub description: Option<String>,
}

impl ParamDef {
    pub fn new(ty: ParamType) -> Self {
        Self {
            ty,
            optional: false,
            description: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An ordered mapping from parameter name to its definition. Insertion
/// order is preserved so JSON-Schema emission and `tools/list` output are
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec(pub IndexMap<String, ParamDef>);

impl ParamSpec {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, def: ParamDef) -> Self {
        self.0.insert(name.into(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamDef)> {
        self.0.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Merge `other` into a copy of `self`; fields already present in
    /// `self` win (used to merge common parameters into an action's own,
    /// with the action's more specific declaration taking precedence).
    #[must_use]
    pub fn merged_with(&self, other: &ParamSpec, exclude: &[String]) -> ParamSpec {
        let mut merged = self.clone();
        for (name, def) in other.iter() {
            if exclude.iter().any(|e| e == name) {
                continue;
            }
            merged.0.entry(name.clone()).or_insert_with(|| def.clone());
        }
        merged
    }
}

/// A single field-level validation failure, formatted `{path}: {message}`
/// per §4.3 step 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validated, typed record. Kept JSON-valued at this boundary (rather than
/// a per-action Rust struct) since the kernel cannot know concrete host
/// types at compile time — see DESIGN NOTES on "dynamic any-typed argument
/// maps": the untyped map lives only at this transport/validation boundary,
/// never leaking into JSON Schema emission or presentation unvalidated.
#[derive(Debug, Clone, Default)]
pub struct ValidatedArgs(pub IndexMap<String, Value>);

impl ValidatedArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

/// Validate `raw` against `spec`, coercing where unambiguous (integer
/// literals into `Number` fields) and collecting every field-level failure
/// rather than stopping at the first (§4.3: "per-field diagnostics").
pub fn validate(spec: &ParamSpec, raw: &Value) -> Result<ValidatedArgs, Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut out = ValidatedArgs::default();

    let obj = match raw {
        Value::Object(map) => map,
        Value::Null => {
            let empty = Map::new();
            return validate_object(spec, &empty);
        }
        _ => {
            errors.push(FieldError::new("$", "expected an object"));
            return Err(errors);
        }
    };

    let result = validate_object(spec, obj);
    match result {
        Ok(args) => {
            out = args;
        }
        Err(errs) => errors.extend(errs),
    }

    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

fn validate_object(spec: &ParamSpec, obj: &Map<String, Value>) -> Result<ValidatedArgs, Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut out = ValidatedArgs::default();

    for (name, def) in spec.iter() {
        match obj.get(name) {
            Some(value) => match validate_value(name, &def.ty, value) {
                Ok(coerced) => out.insert(name.clone(), coerced),
                Err(mut errs) => errors.append(&mut errs),
            },
            None => {
                if !def.optional {
                    errors.push(FieldError::new(name.clone(), "required field missing"));
                }
            }
        }
    }

    if errors.is_empty() { Ok(out) } else { Err(errors) }
}

fn validate_value(path: &str, ty: &ParamType, value: &Value) -> Result<Value, Vec<FieldError>> {
    match ty {
        ParamType::String { min_len, max_len } => {
            let Some(s) = value.as_str() else {
                return Err(vec![FieldError::new(path, "expected a string")]);
            };
            if let Some(min) = min_len {
                if s.len() < *min {
                    return Err(vec![FieldError::new(
                        path,
                        format!("string shorter than minimum length {min}"),
                    )]);
                }
            }
            if let Some(max) = max_len {
                if s.len() > *max {
                    return Err(vec![FieldError::new(
                        path,
                        format!("string longer than maximum length {max}"),
                    )]);
                }
            }
            Ok(value.clone())
        }
        ParamType::Number { integer, min, max } => {
            let Some(n) = value.as_f64() else {
                return Err(vec![FieldError::new(path, "expected a number")]);
            };
            if *integer && n.fract() != 0.0 {
                return Err(vec![FieldError::new(path, "expected an integer")]);
            }
            if let Some(min) = min {
                if n < *min {
                    return Err(vec![FieldError::new(path, format!("below minimum {min}"))]);
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(vec![FieldError::new(path, format!("above maximum {max}"))]);
                }
            }
            Ok(value.clone())
        }
        ParamType::Boolean => {
            if value.as_bool().is_none() {
                return Err(vec![FieldError::new(path, "expected a boolean")]);
            }
            Ok(value.clone())
        }
        ParamType::Enum(values) => {
            let Some(s) = value.as_str() else {
                return Err(vec![FieldError::new(path, "expected a string enum value")]);
            };
            if !values.iter().any(|v| v == s) {
                return Err(vec![FieldError::new(
                    path,
                    format!("must be one of: {}", values.join(", ")),
                )]);
            }
            Ok(value.clone())
        }
        ParamType::Array {
            item,
            min_items,
            max_items,
        } => {
            let Some(arr) = value.as_array() else {
                return Err(vec![FieldError::new(path, "expected an array")]);
            };
            if let Some(min) = min_items {
                if arr.len() < *min {
                    return Err(vec![FieldError::new(
                        path,
                        format!("fewer than minimum {min} items"),
                    )]);
                }
            }
            if let Some(max) = max_items {
                if arr.len() > *max {
                    return Err(vec![FieldError::new(
                        path,
                        format!("more than maximum {max} items"),
                    )]);
                }
            }
            let mut errors = Vec::new();
            let mut coerced = Vec::with_capacity(arr.len());
            for (idx, element) in arr.iter().enumerate() {
                match validate_value(&format!("{path}[{idx}]"), item, element) {
                    Ok(v) => coerced.push(v),
                    Err(mut errs) => errors.append(&mut errs),
                }
            }
            if errors.is_empty() {
                Ok(Value::Array(coerced))
            } else {
                Err(errors)
            }
        }
    }
}

/// Emit a JSON-Schema (draft 7) fragment describing `spec`.
pub fn to_json_schema(spec: &ParamSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for (name, def) in spec.iter() {
        let mut field_schema = type_to_json_schema(&def.ty);
        if let Some(description) = &def.description {
            field_schema["description"] = Value::String(description.clone());
        }
        properties.insert(name.clone(), field_schema);
        if !def.optional {
            required.push(Value::String(name.clone()));
        }
    }

    let mut schema = serde_json::json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}

fn type_to_json_schema(ty: &ParamType) -> Value {
    match ty {
        ParamType::String { min_len, max_len } => {
            let mut schema = serde_json::json!({"type": "string"});
            if let Some(min) = min_len {
                schema["minLength"] = Value::from(*min);
            }
            if let Some(max) = max_len {
                schema["maxLength"] = Value::from(*max);
            }
            schema
        }
        ParamType::Number { integer, min, max } => {
            let mut schema = serde_json::json!({"type": if *integer { "integer" } else { "number" }});
            if let Some(min) = min {
                schema["minimum"] = Value::from(*min);
            }
            if let Some(max) = max {
                schema["maximum"] = Value::from(*max);
            }
            schema
        }
        ParamType::Boolean => serde_json::json!({"type": "boolean"}),
        ParamType::Enum(values) => serde_json::json!({"type": "string", "enum": values}),
        ParamType::Array {
            item,
            min_items,
            max_items,
        } => {
            let mut schema = serde_json::json!({"type": "array", "items": type_to_json_schema(item)});
            if let Some(min) = min_items {
                schema["minItems"] = Value::from(*min);
            }
            if let Some(max) = max_items {
                schema["maxItems"] = Value::from(*max);
            }
            schema
        }
    }
}

/// Check that `incoming` is compatible with an `existing` declaration of the
/// same parameter name on another action of the same tool (§4.5, §3
/// invariants, S3). Returns a human-readable conflict detail on mismatch.
pub fn check_field_compatibility(existing: &ParamDef, incoming: &ParamDef) -> Result<(), String> {
    let existing_base = existing.ty.base_name();
    let incoming_base = incoming.ty.base_name();
    if existing_base != incoming_base {
        return Err(format!(
            "type mismatch: {existing_base} vs {incoming_base}"
        ));
    }
    if let (ParamType::Enum(a), ParamType::Enum(b)) = (&existing.ty, &incoming.ty) {
        let mut a_sorted = a.clone();
        let mut b_sorted = b.clone();
        a_sorted.sort();
        b_sorted.sort();
        if a_sorted != b_sorted {
            return Err(format!(
                "enum value sets differ: [{}] vs [{}]",
                a.join(","),
                b.join(",")
            ));
        }
    }
    Ok(())
}
