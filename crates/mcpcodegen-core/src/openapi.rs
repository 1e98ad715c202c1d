//! OpenAPI specification loading and reference resolution.
//!
//! The spec is kept as a raw `serde_json::Value` tree with insertion order
//! preserved, so overlay targets and emitted files follow document order.
//!
//! # Examples
//!
//! ```no_run
//! use mcpcodegen_core::openapi::OpenApiContext;
//! use mcpcodegen_core::error::Result;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let spec = OpenApiContext::from_file("openapi.yaml").await?;
//! println!("{}", spec.title().unwrap_or("untitled"));
//! for op in spec.operations() {
//!     println!("{} {}", op.method.to_uppercase(), op.path);
//! }
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::Path;

// External imports (alphabetized)
use serde_json::{Map, Value as JsonValue};
use tokio::fs;

fn load_error(action: &str, origin: &dyn std::fmt::Display, cause: impl std::fmt::Display) -> crate::Error {
    crate::Error::openapi(format!("Failed to {} OpenAPI spec {}: {}", action, origin, cause))
}

/// HTTP methods recognised as operations, in traversal order
pub const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "options", "head"];

const MAX_REF_DEPTH: usize = 32;

/// A loaded spec document
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct OpenApiContext {
    /// Document tree, key order preserved
    pub json: JsonValue,
}

/// A borrowed view of one operation inside the spec tree
#[derive(Debug, Clone, Copy)]
pub struct OperationRef<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub operation: &'a JsonValue,
    pub path_item: &'a JsonValue,
}

impl<'a> OperationRef<'a> {
    pub fn operation_id(&self) -> Option<&'a str> {
        self.operation.get("operationId").and_then(JsonValue::as_str)
    }

    pub fn summary(&self) -> Option<&'a str> {
        self.operation.get("summary").and_then(JsonValue::as_str)
    }

    pub fn description(&self) -> Option<&'a str> {
        self.operation.get("description").and_then(JsonValue::as_str)
    }

    /// Operation-level parameters as written, without path-item merging
    pub fn parameters(&self) -> &'a [JsonValue] {
        self.operation
            .get("parameters")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn request_body(&self) -> Option<&'a JsonValue> {
        self.operation.get("requestBody")
    }
}

impl OpenApiContext {
    /// Wrap an already parsed document
    pub fn from_value(json: JsonValue) -> Self {
        Self { json }
    }

    /// Load from a local path, or fetch when `location` is an http(s) URL
    pub async fn from_file_or_url<P: AsRef<str>>(location: P) -> crate::Result<Self> {
        let location = location.as_ref();
        match location.split_once("://") {
            Some(("http", _)) | Some(("https", _)) => Self::from_url(location).await,
            _ => Self::from_file(location).await,
        }
    }

    /// Load a YAML or JSON spec from disk
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let origin = path.display();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| load_error("read", &origin, e))?;
        Self::parse_content(&content).map_err(|e| load_error("parse", &origin, e))
    }

    /// Fetch a YAML or JSON spec over HTTP
    pub async fn from_url(url: &str) -> crate::Result<Self> {
        log::info!("Fetching OpenAPI spec from {}", url);
        let response = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| load_error("fetch", &url, e))?;
        let content = response
            .text()
            .await
            .map_err(|e| load_error("read", &url, e))?;
        Self::parse_content(&content).map_err(|e| load_error("parse", &url, e))
    }

    /// Parse content as either JSON or YAML
    pub fn parse_content(content: &str) -> Result<Self, String> {
        if let Ok(json) = serde_json::from_str::<JsonValue>(content) {
            if json.is_object() {
                return Ok(Self { json });
            }
        }

        match serde_yaml::from_str::<JsonValue>(content) {
            Ok(json) if json.is_object() => Ok(Self { json }),
            Ok(_) => Err("document root is not a mapping".to_string()),
            Err(e) => Err(format!("content is neither valid JSON nor YAML: {}", e)),
        }
    }

    /// Serialize the document as pretty JSON
    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.json)?)
    }

    /// Write the document as pretty JSON
    pub async fn write_json<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_json_string()?).await?;
        Ok(())
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.json
    }

    pub fn title(&self) -> Option<&str> {
        self.json.get("info")?.get("title")?.as_str()
    }

    /// `info.version`
    pub fn version(&self) -> Option<&str> {
        self.json.get("info")?.get("version")?.as_str()
    }

    /// Version marker: the `openapi` field, else `swagger`
    pub fn spec_version(&self) -> Option<&str> {
        self.json
            .get("openapi")
            .or_else(|| self.json.get("swagger"))
            .and_then(JsonValue::as_str)
    }

    /// True for Swagger 2.0 documents (an unquoted YAML `2.0` counts too)
    pub fn is_swagger2(&self) -> bool {
        match self.json.get("swagger") {
            Some(JsonValue::String(v)) => v == "2.0",
            Some(JsonValue::Number(n)) => n.as_f64() == Some(2.0),
            _ => false,
        }
    }

    /// Server URL: `servers[0].url`, else Swagger `scheme://host` + `basePath`
    pub fn base_path(&self) -> Option<String> {
        if let Some(url) = self
            .json
            .get("servers")
            .and_then(JsonValue::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(JsonValue::as_str)
        {
            return Some(url.to_string());
        }

        let host = self.json.get("host").and_then(JsonValue::as_str)?;
        let base_path = self
            .json
            .get("basePath")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        let scheme = self
            .json
            .get("schemes")
            .and_then(JsonValue::as_array)
            .and_then(|s| s.first())
            .and_then(JsonValue::as_str)
            .unwrap_or("https");
        Some(format!("{}://{}{}", scheme, host, base_path))
    }

    /// The `paths` mapping, if present
    pub fn paths(&self) -> Option<&Map<String, JsonValue>> {
        self.json.get("paths").and_then(JsonValue::as_object)
    }

    /// Every operation, paths in document order and methods in `HTTP_METHODS` order
    pub fn operations(&self) -> Vec<OperationRef<'_>> {
        let mut ops = Vec::new();
        let Some(paths) = self.paths() else {
            return ops;
        };
        for (path, item) in paths {
            for method in HTTP_METHODS {
                if let Some(operation) = item.get(method).filter(|op| op.is_object()) {
                    ops.push(OperationRef {
                        path,
                        method,
                        operation,
                        path_item: item,
                    });
                }
            }
        }
        ops
    }

    /// Named schemas: `components.schemas`, or Swagger `definitions`
    pub fn schemas(&self) -> Option<&Map<String, JsonValue>> {
        self.json
            .get("components")
            .and_then(|c| c.get("schemas"))
            .or_else(|| self.json.get("definitions"))
            .and_then(JsonValue::as_object)
    }

    /// Look up an in-document reference such as `#/components/schemas/Pet`.
    ///
    /// External references are not followed.
    pub fn resolve_ref(&self, reference: &str) -> Option<&JsonValue> {
        let pointer = reference.strip_prefix('#')?;
        if pointer.is_empty() {
            return Some(&self.json);
        }
        self.json.pointer(pointer)
    }

    /// Follow a `$ref` chain until a concrete node is reached
    pub fn resolve<'a>(&'a self, value: &'a JsonValue) -> &'a JsonValue {
        let mut current = value;
        for _ in 0..MAX_REF_DEPTH {
            let Some(reference) = current.get("$ref").and_then(JsonValue::as_str) else {
                return current;
            };
            match self.resolve_ref(reference) {
                Some(target) => current = target,
                None => {
                    log::warn!("Unresolvable reference: {}", reference);
                    return current;
                }
            }
        }
        log::warn!("Reference chain too deep, giving up");
        current
    }

    /// Resolve a schema to a concrete object, folding `allOf` branches together.
    ///
    /// `properties` and `required` of every branch are merged; the first
    /// branch to declare a `type` wins. `oneOf`/`anyOf` are left for callers.
    pub fn resolve_schema(&self, schema: &JsonValue) -> JsonValue {
        self.resolve_schema_depth(schema, 0)
    }

    fn resolve_schema_depth(&self, schema: &JsonValue, depth: usize) -> JsonValue {
        let resolved = self.resolve(schema);
        let Some(all_of) = resolved.get("allOf").and_then(JsonValue::as_array) else {
            return resolved.clone();
        };
        if depth >= MAX_REF_DEPTH {
            return resolved.clone();
        }

        let mut merged = resolved.as_object().cloned().unwrap_or_default();
        merged.remove("allOf");
        let mut properties = merged
            .remove("properties")
            .and_then(|p| p.as_object().cloned())
            .unwrap_or_default();
        let mut required: Vec<JsonValue> = merged
            .remove("required")
            .and_then(|r| r.as_array().cloned())
            .unwrap_or_default();

        for branch in all_of {
            let branch = self.resolve_schema_depth(branch, depth + 1);
            if let Some(props) = branch.get("properties").and_then(JsonValue::as_object) {
                for (name, prop) in props {
                    properties.entry(name.clone()).or_insert_with(|| prop.clone());
                }
            }
            if let Some(req) = branch.get("required").and_then(JsonValue::as_array) {
                for name in req {
                    if !required.contains(name) {
                        required.push(name.clone());
                    }
                }
            }
            for key in ["type", "description", "enum", "items"] {
                if let Some(value) = branch.get(key) {
                    merged.entry(key.to_string()).or_insert_with(|| value.clone());
                }
            }
        }

        if !properties.is_empty() {
            merged
                .entry("type".to_string())
                .or_insert_with(|| JsonValue::String("object".to_string()));
            merged.insert("properties".to_string(), JsonValue::Object(properties));
        }
        if !required.is_empty() {
            merged.insert("required".to_string(), JsonValue::Array(required));
        }
        JsonValue::Object(merged)
    }

    /// Path-item parameters merged with operation parameters, references resolved.
    ///
    /// An operation parameter replaces a path-item parameter with the same
    /// `(name, in)`; order is path-item first, then new operation entries.
    pub fn merged_parameters(&self, op: &OperationRef<'_>) -> Vec<JsonValue> {
        let mut merged: Vec<JsonValue> = Vec::new();
        let path_level = op
            .path_item
            .get("parameters")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for param in path_level.iter().chain(op.parameters()) {
            let resolved = self.resolve(param).clone();
            let key = parameter_key(&resolved);
            match merged.iter_mut().find(|p| parameter_key(p) == key) {
                Some(existing) => *existing = resolved,
                None => merged.push(resolved),
            }
        }
        merged
    }
}

fn parameter_key(param: &JsonValue) -> (Option<String>, Option<String>) {
    (
        param.get("name").and_then(JsonValue::as_str).map(String::from),
        param.get("in").and_then(JsonValue::as_str).map(String::from),
    )
}
