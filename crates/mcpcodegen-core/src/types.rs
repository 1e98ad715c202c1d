//! Mapping of OpenAPI schema fragments to Python type expressions.

use serde_json::Value as JsonValue;

use crate::openapi::OpenApiContext;

const MAX_NESTING: usize = 16;

/// Maps schemas of one spec to the type annotations used in emitted Python
#[derive(Debug, Clone, Copy)]
pub struct PythonTypeMapper<'a> {
    spec: &'a OpenApiContext,
}

impl<'a> PythonTypeMapper<'a> {
    pub fn new(spec: &'a OpenApiContext) -> Self {
        Self { spec }
    }

    /// Python annotation for `schema`.
    ///
    /// Enums become `Literal[...]` whatever their declared type. Objects map to
    /// `Dict[str, Any]`; flattening of object bodies is the extractor's job.
    pub fn map(&self, schema: &JsonValue) -> String {
        self.map_depth(schema, 0)
    }

    fn map_depth(&self, schema: &JsonValue, depth: usize) -> String {
        if depth > MAX_NESTING {
            return "Any".to_string();
        }
        let schema = self.spec.resolve_schema(schema);

        if let Some(values) = schema.get("enum").and_then(JsonValue::as_array) {
            if !values.is_empty() {
                let literals: Vec<String> = values.iter().map(python_literal).collect();
                return format!("Literal[{}]", literals.join(", "));
            }
        }

        match schema_type(&schema) {
            Some("integer") => "int".to_string(),
            Some("number") => "float".to_string(),
            Some("boolean") => "bool".to_string(),
            Some("string") => "str".to_string(),
            Some("array") => {
                let item_type = schema
                    .get("items")
                    .map(|items| self.map_depth(items, depth + 1))
                    .unwrap_or_else(|| "Any".to_string());
                format!("List[{}]", item_type)
            }
            Some("object") => "Dict[str, Any]".to_string(),
            _ if schema.get("properties").is_some() => "Dict[str, Any]".to_string(),
            _ => self.map_composition(&schema, depth),
        }
    }

    /// `oneOf`/`anyOf` map to the branch type when all branches agree, else `Any`
    fn map_composition(&self, schema: &JsonValue, depth: usize) -> String {
        let branches = schema
            .get("oneOf")
            .or_else(|| schema.get("anyOf"))
            .and_then(JsonValue::as_array);
        let Some(branches) = branches else {
            return "str".to_string();
        };
        let mut mapped: Vec<String> = branches
            .iter()
            .filter(|b| schema_type(b) != Some("null"))
            .map(|b| self.map_depth(b, depth + 1))
            .collect();
        mapped.dedup();
        match mapped.as_slice() {
            [single] => single.clone(),
            [] => "str".to_string(),
            _ => "Any".to_string(),
        }
    }
}

/// Declared `type`, taking the first non-null entry of a type list
pub fn schema_type(schema: &JsonValue) -> Option<&str> {
    match schema.get("type")? {
        JsonValue::String(t) => Some(t.as_str()),
        JsonValue::Array(types) => types
            .iter()
            .filter_map(JsonValue::as_str)
            .find(|t| *t != "null"),
        _ => None,
    }
}

/// Render a JSON scalar as a Python literal
pub fn python_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "None".to_string(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => {
            serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
        }
        other => serde_json::to_string(&other.to_string())
            .unwrap_or_else(|_| "None".to_string()),
    }
}
