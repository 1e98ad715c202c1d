//! In-place cleanup of an enhanced spec.
//!
//! Runs three passes in order: Swagger 2.0 version conversion, removal of
//! legacy `in: body` parameters and schema synthesis for parameters that
//! declare neither `schema` nor `content`. Every pass is idempotent.

use serde_json::{json, Map, Value as JsonValue};

use crate::openapi::HTTP_METHODS;

const INTEGER_HINTS: [&str; 11] = [
    "limit", "timeout", "seconds", "nanos", "period", "retries", "count", "size", "port", "lines",
    "bytes",
];
const BOOLEAN_HINTS: [&str; 11] = [
    "watch",
    "follow",
    "previous",
    "timestamps",
    "orphan",
    "force",
    "enabled",
    "allow",
    "skip",
    "insecure",
    "stream",
];

/// What a normalization run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationStats {
    pub converted_swagger: bool,
    pub parameters_fixed: usize,
    pub body_params_converted: usize,
}

impl NormalizationStats {
    pub fn total_fixes(&self) -> usize {
        self.parameters_fixed + self.body_params_converted
    }
}

/// Normalize `spec` in place
pub fn normalize(spec: &mut JsonValue) -> NormalizationStats {
    let mut stats = NormalizationStats {
        converted_swagger: convert_swagger2(spec),
        ..NormalizationStats::default()
    };

    let Some(paths) = spec.get_mut("paths").and_then(JsonValue::as_object_mut) else {
        return stats;
    };
    for (path, item) in paths.iter_mut() {
        for method in HTTP_METHODS {
            let Some(operation) = item.get_mut(method).and_then(JsonValue::as_object_mut) else {
                continue;
            };
            let Some(params) = operation
                .get_mut("parameters")
                .and_then(JsonValue::as_array_mut)
            else {
                continue;
            };

            let before = params.len();
            params.retain(|p| p.get("in").and_then(JsonValue::as_str) != Some("body"));
            let removed = before - params.len();
            if removed > 0 {
                log::debug!(
                    "Removed {} body parameter(s) from {} {}",
                    removed,
                    method.to_uppercase(),
                    path
                );
                stats.body_params_converted += removed;
            }

            for param in params.iter_mut().filter_map(JsonValue::as_object_mut) {
                if synthesize_schema(param) {
                    log::debug!(
                        "Fixed parameter '{}' in {} {}",
                        param.get("name").and_then(JsonValue::as_str).unwrap_or(""),
                        method.to_uppercase(),
                        path
                    );
                    stats.parameters_fixed += 1;
                }
            }
        }
    }

    if stats.parameters_fixed > 0 {
        log::info!(
            "Fixed {} parameters missing schema definitions",
            stats.parameters_fixed
        );
    }
    if stats.body_params_converted > 0 {
        log::info!(
            "Removed {} invalid 'body' parameters (OpenAPI 2.0 style)",
            stats.body_params_converted
        );
    }
    stats
}

/// Rewrite a Swagger 2.0 root as OpenAPI 3.0.0; returns whether it did
fn convert_swagger2(spec: &mut JsonValue) -> bool {
    let Some(root) = spec.as_object_mut() else {
        return false;
    };
    let is_swagger2 = match root.get("swagger") {
        Some(JsonValue::String(v)) => v == "2.0",
        Some(JsonValue::Number(n)) => n.as_f64() == Some(2.0),
        _ => false,
    };
    if !is_swagger2 {
        return false;
    }

    log::info!("Detected Swagger 2.0 spec, converting to OpenAPI 3.0");
    root.insert("openapi".to_string(), json!("3.0.0"));
    root.shift_remove("swagger");

    let base_path = root
        .shift_remove("basePath")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    let scheme = root
        .shift_remove("schemes")
        .and_then(|v| v.get(0).and_then(JsonValue::as_str).map(String::from))
        .unwrap_or_else(|| "https".to_string());
    let host = root
        .shift_remove("host")
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "localhost".to_string());

    let has_servers = root
        .get("servers")
        .and_then(JsonValue::as_array)
        .map_or(false, |s| !s.is_empty());
    if !has_servers {
        root.insert(
            "servers".to_string(),
            json!([{ "url": format!("{}://{}{}", scheme, host, base_path) }]),
        );
    }
    true
}

/// Give a schema-less parameter an inferred `schema`; returns whether it did
fn synthesize_schema(param: &mut Map<String, JsonValue>) -> bool {
    if param.contains_key("$ref") || param.contains_key("schema") || param.contains_key("content") {
        return false;
    }
    if param.get("in").and_then(JsonValue::as_str) == Some("cookie") {
        return false;
    }

    let name = param
        .get("name")
        .and_then(JsonValue::as_str)
        .unwrap_or("")
        .to_lowercase();
    param.insert("schema".to_string(), json!({ "type": infer_type(&name) }));
    param.shift_remove("type");
    true
}

/// Type implied by a lowercased parameter name
pub fn infer_type(name: &str) -> &'static str {
    if INTEGER_HINTS.iter().any(|hint| name.contains(hint)) {
        "integer"
    } else if BOOLEAN_HINTS.iter().any(|hint| name.contains(hint)) {
        "boolean"
    } else {
        "string"
    }
}
