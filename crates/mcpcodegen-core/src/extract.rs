//! Turns operations into the function signatures of emitted tools.
//!
//! Path parameters become `path_<name>`, query parameters `param_<name>` and
//! request body properties `body_<name>`. Nested body objects are flattened
//! with `__` between levels so the generated code can rebuild the JSON body
//! from argument names alone.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::openapi::{OpenApiContext, OperationRef};
use crate::types::{schema_type, PythonTypeMapper};
use crate::utils::{function_name, path_to_module_name, python_identifier};

const MAX_BODY_DEPTH: usize = 8;
const OBJECT_LIST: &str = "List[Dict[str, Any]]";
const FREE_OBJECT: &str = "Dict[str, Any]";

/// Where a tool argument goes in the HTTP request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

/// One argument of an emitted tool function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParam {
    /// Python argument name
    pub name: String,
    /// Python type annotation
    pub py_type: String,
    /// Python default expression; `None` for required arguments
    pub default: Option<String>,
    pub location: ParamLocation,
    /// Query key, path placeholder, or `__`-joined body key path
    pub key: String,
    pub description: String,
    /// `name: type` or `name: type = default`
    pub signature: String,
}

impl ToolParam {
    fn new(
        name: String,
        py_type: String,
        default: Option<String>,
        location: ParamLocation,
        key: String,
        description: String,
    ) -> Self {
        let signature = match &default {
            Some(default) => format!("{}: {} = {}", name, py_type, default),
            None => format!("{}: {}", name, py_type),
        };
        Self {
            name,
            py_type,
            default,
            location,
            key,
            description,
            signature,
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Docstring entry for one argument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub py_type: String,
    pub description: String,
}

/// Everything the templates need to emit one tool function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFunction {
    /// Raw `operationId`, or a synthesized one when the spec has none
    pub operation_id: String,
    /// Python function name
    pub name: String,
    /// Upper-case HTTP method
    pub method: String,
    pub http_path: String,
    /// `http_path` with placeholders renamed to the `path_` arguments
    pub formatted_path: String,
    pub params: Vec<ToolParam>,
    pub summary: String,
    pub description: String,
}

impl ToolFunction {
    pub fn signatures(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.signature.as_str()).collect()
    }

    pub fn params_info(&self) -> Vec<ParamDoc> {
        self.params
            .iter()
            .map(|p| ParamDoc {
                name: p.name.clone(),
                py_type: p.py_type.clone(),
                description: p.description.clone(),
            })
            .collect()
    }

    pub fn has_body(&self) -> bool {
        self.params.iter().any(|p| p.location == ParamLocation::Body)
    }
}

/// Builds [`ToolFunction`]s from operations of one spec
#[derive(Debug, Clone, Copy)]
pub struct ParameterExtractor<'a> {
    spec: &'a OpenApiContext,
    types: PythonTypeMapper<'a>,
}

impl<'a> ParameterExtractor<'a> {
    pub fn new(spec: &'a OpenApiContext) -> Self {
        Self {
            spec,
            types: PythonTypeMapper::new(spec),
        }
    }

    pub fn extract(&self, op: &OperationRef<'_>) -> ToolFunction {
        let mut params = Vec::new();
        let mut formatted_path = op.path.to_string();

        for param in self.spec.merged_parameters(op) {
            let Some(name) = param.get("name").and_then(JsonValue::as_str) else {
                log::warn!(
                    "Skipping parameter without name in {} {}",
                    op.method.to_uppercase(),
                    op.path
                );
                continue;
            };
            let description = text(&param, "description");
            let schema = param.get("schema").cloned().unwrap_or_else(|| legacy_schema(&param));

            match param.get("in").and_then(JsonValue::as_str) {
                Some("path") => {
                    let arg = format!("path_{}", python_identifier(name));
                    formatted_path =
                        formatted_path.replace(&format!("{{{}}}", name), &format!("{{{}}}", arg));
                    params.push(ToolParam::new(
                        arg,
                        self.types.map(&schema),
                        None,
                        ParamLocation::Path,
                        name.to_string(),
                        description,
                    ));
                }
                Some("query") => {
                    let py_type = self.types.map(&schema);
                    let required = param.get("required").and_then(JsonValue::as_bool).unwrap_or(false);
                    let default = match (required, py_type.as_str()) {
                        (true, _) => None,
                        (false, "bool") => Some("False".to_string()),
                        (false, _) => Some("None".to_string()),
                    };
                    params.push(ToolParam::new(
                        format!("param_{}", python_identifier(name)),
                        py_type,
                        default,
                        ParamLocation::Query,
                        name.to_string(),
                        description,
                    ));
                }
                Some("body") => {
                    let required = param.get("required").and_then(JsonValue::as_bool).unwrap_or(false);
                    self.flatten(&schema, "body", &[], 0, required, &description, &mut params);
                }
                _ => {}
            }
        }

        if let Some(body) = op.request_body() {
            self.extract_request_body(body, &mut params);
        }

        // Stable partition: arguments without defaults come first
        let (mut ordered, defaulted): (Vec<_>, Vec<_>) =
            params.into_iter().partition(ToolParam::is_required);
        ordered.extend(defaulted);

        let name = match op.operation_id() {
            Some(id) if !id.trim().is_empty() => function_name(id),
            _ => format!("{}_{}", op.method, path_to_module_name(op.path)),
        };

        ToolFunction {
            operation_id: op
                .operation_id()
                .map(String::from)
                .unwrap_or_else(|| name.clone()),
            name,
            method: op.method.to_uppercase(),
            http_path: op.path.to_string(),
            formatted_path,
            params: ordered,
            summary: op.summary().unwrap_or("").trim().to_string(),
            description: op.description().unwrap_or("").trim().to_string(),
        }
    }

    fn extract_request_body(&self, body: &JsonValue, params: &mut Vec<ToolParam>) {
        let body = self.spec.resolve(body);
        let Some(content) = body.get("content").and_then(JsonValue::as_object) else {
            return;
        };
        let media = content
            .get("application/json")
            .or_else(|| content.values().next());
        let Some(schema) = media.and_then(|m| m.get("schema")) else {
            return;
        };
        let required = body.get("required").and_then(JsonValue::as_bool).unwrap_or(false);
        let description = text(body, "description");
        self.flatten(schema, "body", &[], 0, required, &description, params);
    }

    /// Emit arguments for `schema` under `prefix`.
    ///
    /// `required` is whether this node itself must be supplied; at the root
    /// it only matters for non-object bodies, since root properties follow
    /// the schema's own `required` list.
    #[allow(clippy::too_many_arguments)]
    fn flatten(
        &self,
        schema: &JsonValue,
        prefix: &str,
        keys: &[String],
        depth: usize,
        required: bool,
        description: &str,
        out: &mut Vec<ToolParam>,
    ) {
        let schema = self.spec.resolve(schema);
        let description = match text(schema, "description") {
            d if d.is_empty() => description.to_string(),
            d => d,
        };

        let branches: Vec<&JsonValue> = ["allOf", "oneOf", "anyOf"]
            .iter()
            .filter_map(|k| schema.get(*k).and_then(JsonValue::as_array))
            .flatten()
            .collect();
        if !branches.is_empty() && schema.get("enum").is_none() {
            let mut merged: Vec<ToolParam> = Vec::new();
            if schema.get("properties").is_some() {
                let mut own = schema.clone();
                if let Some(map) = own.as_object_mut() {
                    for key in ["allOf", "oneOf", "anyOf"] {
                        map.remove(key);
                    }
                }
                self.flatten(&own, prefix, keys, depth, required, &description, &mut merged);
            }
            for branch in branches {
                let mut found = Vec::new();
                self.flatten(branch, prefix, keys, depth, required, &description, &mut found);
                // Only identical signatures collapse; conflicting branches keep both
                for param in found {
                    if !merged.iter().any(|p| p.signature == param.signature) {
                        merged.push(param);
                    }
                }
            }
            out.extend(merged);
            return;
        }

        let properties = schema.get("properties").and_then(JsonValue::as_object);
        let is_object = schema_type(schema) == Some("object") || properties.is_some();
        let has_enum = schema.get("enum").is_some();

        if is_object && !has_enum {
            match properties.filter(|p| !p.is_empty()) {
                Some(properties) if depth < MAX_BODY_DEPTH => {
                    let required_list: Vec<&str> = schema
                        .get("required")
                        .and_then(JsonValue::as_array)
                        .map(|r| r.iter().filter_map(JsonValue::as_str).collect())
                        .unwrap_or_default();
                    let delimiter = if depth == 0 { "_" } else { "__" };
                    let parent_required = depth == 0 || required;
                    for (prop, prop_schema) in properties {
                        let child_required = parent_required && required_list.contains(&prop.as_str());
                        let mut child_keys = keys.to_vec();
                        child_keys.push(prop.clone());
                        self.flatten(
                            prop_schema,
                            &format!("{}{}{}", prefix, delimiter, python_identifier(prop)),
                            &child_keys,
                            depth + 1,
                            child_required,
                            "",
                            out,
                        );
                    }
                }
                _ => out.push(body_param(prefix, FREE_OBJECT.to_string(), keys, required, description)),
            }
            return;
        }

        let py_type = if schema_type(schema) == Some("array") && !has_enum && self.items_are_objects(schema) {
            OBJECT_LIST.to_string()
        } else {
            self.types.map(schema)
        };
        out.push(body_param(prefix, py_type, keys, required, description));
    }

    fn items_are_objects(&self, schema: &JsonValue) -> bool {
        schema.get("items").map_or(false, |items| {
            let items = self.spec.resolve_schema(items);
            schema_type(&items) == Some("object") || items.get("properties").is_some()
        })
    }
}

fn body_param(
    name: &str,
    py_type: String,
    keys: &[String],
    required: bool,
    description: String,
) -> ToolParam {
    ToolParam::new(
        name.to_string(),
        py_type,
        if required { None } else { Some("None".to_string()) },
        ParamLocation::Body,
        keys.join("__"),
        description,
    )
}

/// Schema implied by a Swagger 2.0 style parameter with a top-level `type`
fn legacy_schema(param: &JsonValue) -> JsonValue {
    let mut schema = serde_json::Map::new();
    for key in ["type", "format", "enum", "items"] {
        if let Some(value) = param.get(key) {
            schema.insert(key.to_string(), value.clone());
        }
    }
    JsonValue::Object(schema)
}

fn text(value: &JsonValue, key: &str) -> String {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> OpenApiContext {
        OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "info": {"title": "Pets", "version": "1.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [
                            {"name": "limit", "in": "query", "required": false, "schema": {"type": "integer"}},
                            {"name": "X-Trace", "in": "header", "schema": {"type": "string"}}
                        ]
                    },
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {"content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/Pet"}
                        }}}
                    }
                },
                "/pets/{pet.id}": {
                    "get": {
                        "operationId": "showPetById",
                        "parameters": [
                            {"name": "pet.id", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}},
                            {"name": "fields", "in": "query", "required": true,
                             "schema": {"type": "string", "enum": ["all"]}}
                        ]
                    }
                },
                "/deploy": {
                    "put": {
                        "requestBody": {"content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {
                                "spec": {
                                    "type": "object",
                                    "required": ["replicas"],
                                    "properties": {
                                        "replicas": {"type": "integer"},
                                        "template": {"type": "object", "properties": {
                                            "image": {"type": "string"}
                                        }}
                                    }
                                },
                                "metadata": {
                                    "type": "object",
                                    "required": ["name"],
                                    "properties": {"name": {"type": "string"}}
                                },
                                "containers": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
                            },
                            "required": ["metadata"]
                        }}}}
                    }
                },
                "/ping": {"get": {"operationId": "ping"}}
            },
            "components": {"schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }}
        }))
    }

    fn extract(spec: &OpenApiContext, path: &str, method: &str) -> ToolFunction {
        let op = spec
            .operations()
            .into_iter()
            .find(|op| op.path == path && op.method == method)
            .unwrap_or_else(|| panic!("missing {} {}", method, path));
        ParameterExtractor::new(spec).extract(&op)
    }

    #[test]
    fn test_query_parameter_defaults() {
        let spec = petstore();
        let tool = extract(&spec, "/pets", "get");
        assert_eq!(tool.name, "list_pets");
        assert_eq!(tool.signatures(), vec!["param_limit: int = None"]);
        assert_eq!(tool.params[0].key, "limit");
    }

    #[test]
    fn test_request_body_flattening() {
        let spec = petstore();
        let tool = extract(&spec, "/pets", "post");
        assert_eq!(tool.name, "create_pet");
        assert_eq!(
            tool.signatures(),
            vec!["body_name: str", "body_tags: List[str] = None"]
        );
        assert!(tool.has_body());
        assert_eq!(tool.params[1].key, "tags");
    }

    #[test]
    fn test_path_parameter_with_dot() {
        let spec = petstore();
        let tool = extract(&spec, "/pets/{pet.id}", "get");
        assert_eq!(tool.formatted_path, "/pets/{path_pet_id}");
        assert_eq!(
            tool.signatures(),
            vec![
                "path_pet_id: str",
                "param_fields: Literal[\"all\"]",
                "param_verbose: bool = False",
            ]
        );
    }

    #[test]
    fn test_nested_required_needs_required_parent() {
        let spec = petstore();
        let tool = extract(&spec, "/deploy", "put");
        assert_eq!(tool.name, "put_deploy");
        assert_eq!(
            tool.signatures(),
            vec![
                "body_metadata__name: str",
                "body_spec__replicas: int = None",
                "body_spec__template__image: str = None",
                "body_containers: List[Dict[str, Any]] = None",
            ]
        );
        let keys: Vec<&str> = tool.params.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["metadata__name", "spec__replicas", "spec__template__image", "containers"]
        );
    }

    #[test]
    fn test_operation_without_parameters() {
        let spec = petstore();
        let tool = extract(&spec, "/ping", "get");
        assert!(tool.params.is_empty());
        assert_eq!(tool.method, "GET");
    }

    #[test]
    fn test_compositions_are_merged_without_duplicates() {
        let spec = OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/x": {"post": {
                "operationId": "makeX",
                "parameters": [{"name": "body", "in": "body", "required": true, "schema": {
                    "allOf": [
                        {"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}},
                        {"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}, "note": {"type": "string"}}}
                    ]
                }}]
            }}}
        }));
        let tool = extract(&spec, "/x", "post");
        assert_eq!(
            tool.signatures(),
            vec!["body_id: int", "body_note: str = None"]
        );
    }

    #[test]
    fn test_conflicting_branches_keep_both_signatures() {
        let spec = OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/x": {"post": {
                "operationId": "setValue",
                "requestBody": {"content": {"application/json": {"schema": {
                    "oneOf": [
                        {"type": "object", "properties": {"value": {"type": "string"}}},
                        {"type": "object", "properties": {"value": {"type": "integer"}}},
                        {"type": "object", "properties": {"value": {"type": "string"}}}
                    ]
                }}}}
            }}}
        }));
        let tool = extract(&spec, "/x", "post");
        assert_eq!(
            tool.signatures(),
            vec!["body_value: str = None", "body_value: int = None"]
        );
    }

    #[test]
    fn test_scalar_body() {
        let spec = OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/raw": {"post": {
                "operationId": "postRaw",
                "requestBody": {"required": true, "content": {"text/plain": {"schema": {"type": "string"}}}}
            }}}
        }));
        let tool = extract(&spec, "/raw", "post");
        assert_eq!(tool.signatures(), vec!["body: str"]);
        assert_eq!(tool.params[0].key, "");
    }
}
