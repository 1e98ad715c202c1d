//! Scored compliance checks over an original/enhanced spec pair.
//!
//! Each check is a pure function of its inputs returning a [`CheckResult`];
//! pass thresholds live in [`Thresholds`] so callers can tighten or relax
//! them without touching the scoring.

use std::fmt::Write as _;
use std::time::Duration;

use serde_json::{json, Map, Value as JsonValue};

use super::metrics::{group_thousands, Metrics};
use crate::openapi::{OpenApiContext, HTTP_METHODS};

const RULE: &str = "================================================================================";
const LEGACY_FIELDS: [&str; 6] = ["swagger", "basePath", "host", "schemes", "consumes", "produces"];
const BODY_METHODS: [&str; 3] = ["post", "put", "patch"];
const SAMPLE_PATHS: usize = 5;

/// Outcome of one check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    /// 0-100
    pub score: f64,
    pub message: String,
    pub details: Map<String, JsonValue>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckResult {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            passed: false,
            score: 0.0,
            message: String::new(),
            details: Map::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn detail(&mut self, key: &str, value: JsonValue) {
        self.details.insert(key.to_string(), value);
    }

    /// `swagger_conversion` -> `Swagger Conversion`
    pub fn title(&self) -> String {
        self.name
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Pass thresholds for every check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub conversion_success_rate: f64,
    pub parameter_fix_rate: f64,
    pub body_param_conversion_rate: f64,
    pub openapi_compliance: f64,
    /// Maximum processing time increase over the baseline, in percent
    pub performance_increase_limit: f64,
    /// Processing time under which a run without baseline scores 100
    pub unbaselined_fast_seconds: f64,
    /// Minimum average score for an overall pass
    pub overall_average: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conversion_success_rate: 95.0,
            parameter_fix_rate: 100.0,
            body_param_conversion_rate: 100.0,
            openapi_compliance: 80.0,
            performance_increase_limit: 25.0,
            unbaselined_fast_seconds: 60.0,
            overall_average: 85.0,
        }
    }
}

/// Runs the compliance suite
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceValidator {
    pub thresholds: Thresholds,
}

impl ComplianceValidator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Run every check in report order
    pub fn run(
        &self,
        original: &OpenApiContext,
        enhanced: &OpenApiContext,
        processing_time: Option<Duration>,
        baseline: Option<Duration>,
    ) -> ValidationReport {
        log::info!("Running compliance validation suite");
        ValidationReport {
            checks: vec![
                self.swagger_conversion(original, enhanced),
                self.parameter_schemas(enhanced),
                self.body_parameter_conversion(original, enhanced),
                self.openapi_compliance(enhanced),
                self.performance(processing_time.unwrap_or_default(), baseline),
            ],
            overall_average: self.thresholds.overall_average,
        }
    }

    pub fn swagger_conversion(&self, original: &OpenApiContext, enhanced: &OpenApiContext) -> CheckResult {
        let mut result = CheckResult::new("swagger_conversion");
        let spec = &enhanced.json;
        let was_swagger = original.is_swagger2();
        // Only the `openapi` key counts; a leftover `swagger` key is not a version
        let openapi = spec.get("openapi").map(|v| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        });
        let version_ok = openapi.as_deref().map_or(false, |v| v.starts_with("3."));
        let mut remaining: Vec<&str> = Vec::new();

        if was_swagger {
            match &openapi {
                None => result.errors.push("Missing 'openapi' field in enhanced spec".to_string()),
                Some(v) if !version_ok => result.errors.push(format!("Invalid OpenAPI version: {}", v)),
                Some(_) => result.score += 30.0,
            }

            remaining = LEGACY_FIELDS.into_iter().filter(|f| spec.get(f).is_some()).collect();
            if remaining.is_empty() {
                result.score += 20.0;
            } else {
                result
                    .warnings
                    .push(format!("Swagger 2.0 fields still present: {:?}", remaining));
            }

            let has_servers = spec
                .get("servers")
                .and_then(JsonValue::as_array)
                .map_or(false, |s| !s.is_empty());
            if has_servers {
                result.score += 20.0;
            } else {
                result
                    .warnings
                    .push("No servers field found (should be converted from host/basePath)".to_string());
            }
        } else if version_ok {
            result.score += 70.0;
        } else {
            result
                .errors
                .push("OpenAPI version corrupted during enhancement".to_string());
        }

        for field in ["info", "paths"] {
            if spec.get(field).is_some() {
                result.score += 15.0;
            } else {
                result.errors.push(format!("Missing required field: {}", field));
            }
        }

        result.passed =
            result.errors.is_empty() && result.score >= self.thresholds.conversion_success_rate;
        result.message = format!(
            "Swagger conversion: {:.1}% ({})",
            result.score,
            verdict(result.passed)
        );
        result.detail("was_swagger_2_0", json!(was_swagger));
        result.detail("final_openapi_version", json!(openapi));
        result.detail("remaining_swagger_fields", json!(remaining));
        result
    }

    pub fn parameter_schemas(&self, enhanced: &OpenApiContext) -> CheckResult {
        let mut result = CheckResult::new("parameter_schemas");
        let mut total = 0usize;
        let mut invalid = 0usize;

        for op in enhanced.operations() {
            for raw in op.parameters() {
                total += 1;
                let param = enhanced.resolve(raw);
                let name = param
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("param_{}", total));
                let location = format!("{} {}", op.method.to_uppercase(), op.path);
                let is_cookie = param.get("in").and_then(JsonValue::as_str) == Some("cookie");

                match (param.get("schema"), param.get("content")) {
                    (Some(schema), _) => {
                        let typed = schema.get("type").is_some() || schema.get("$ref").is_some();
                        if !schema.is_object() || !typed {
                            result.errors.push(format!(
                                "Invalid schema for parameter '{}' in {}",
                                name, location
                            ));
                            invalid += 1;
                        }
                    }
                    (None, Some(_)) => {}
                    (None, None) if is_cookie => {}
                    (None, None) if param.get("type").is_some() => result.warnings.push(format!(
                        "Parameter '{}' in {} uses direct 'type' (Swagger 2.0 style)",
                        name, location
                    )),
                    (None, None) => {
                        result.errors.push(format!(
                            "Parameter '{}' in {} missing schema/content",
                            name, location
                        ));
                        invalid += 1;
                    }
                }
            }
        }

        let valid = total.saturating_sub(invalid);
        result.score = if total > 0 {
            valid as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        result.passed = result.score >= self.thresholds.parameter_fix_rate;
        result.message = format!(
            "Parameter schemas: {}/{} valid ({:.1}%) ({})",
            valid,
            total,
            result.score,
            verdict(result.passed)
        );
        result.detail("total_parameters", json!(total));
        result.detail("valid_parameters", json!(valid));
        result.detail("invalid_parameters", json!(invalid));
        result
    }

    pub fn body_parameter_conversion(
        &self,
        original: &OpenApiContext,
        enhanced: &OpenApiContext,
    ) -> CheckResult {
        let mut result = CheckResult::new("body_parameter_conversion");
        let is_body = |p: &&JsonValue| p.get("in").and_then(JsonValue::as_str) == Some("body");

        let original_count: usize = original
            .operations()
            .iter()
            .filter(|op| BODY_METHODS.iter().any(|m| *m == op.method))
            .map(|op| op.parameters().iter().filter(is_body).count())
            .sum();

        let mut remaining = 0usize;
        let mut with_request_body = 0usize;
        for op in enhanced.operations() {
            for _ in op.parameters().iter().filter(is_body) {
                remaining += 1;
                result.errors.push(format!(
                    "Body parameter still present in {} {}",
                    op.method.to_uppercase(),
                    op.path
                ));
            }
            if BODY_METHODS.iter().any(|m| *m == op.method) && op.request_body().is_some() {
                with_request_body += 1;
            }
        }

        let converted = original_count.saturating_sub(remaining);
        result.score = if original_count > 0 {
            converted as f64 / original_count as f64 * 100.0
        } else {
            100.0
        };
        result.passed = remaining == 0 && result.score >= self.thresholds.body_param_conversion_rate;
        result.message = format!(
            "Body parameter conversion: {}/{} converted ({:.1}%) ({})",
            converted,
            original_count,
            result.score,
            verdict(result.passed)
        );
        result.detail("original_body_params", json!(original_count));
        result.detail("remaining_body_params", json!(remaining));
        result.detail("converted_body_params", json!(converted));
        result.detail("operations_with_request_body", json!(with_request_body));
        result
    }

    pub fn openapi_compliance(&self, enhanced: &OpenApiContext) -> CheckResult {
        let mut result = CheckResult::new("openapi_compliance");
        let spec = &enhanced.json;

        for (field, points) in [("openapi", 20.0), ("info", 20.0), ("paths", 30.0)] {
            if spec.get(field).is_some() {
                result.score += points;
            } else {
                result.errors.push(format!("Missing required field: {}", field));
            }
        }

        if let Some(info) = spec.get("info") {
            if info.get("title").is_some() && info.get("version").is_some() {
                result.score += 10.0;
            } else {
                result.warnings.push("Info object missing title or version".to_string());
            }
        }

        if spec.get("paths").is_some() {
            match enhanced.paths().filter(|p| !p.is_empty()) {
                Some(paths) => {
                    result.score += 10.0;
                    let mut sampled = 0usize;
                    let mut valid = 0usize;
                    for (_, item) in paths.iter().take(SAMPLE_PATHS) {
                        for method in &HTTP_METHODS[..5] {
                            if let Some(operation) = item.get(*method) {
                                sampled += 1;
                                if operation.is_object() {
                                    valid += 1;
                                }
                            }
                        }
                    }
                    if sampled > 0 && valid as f64 / sampled as f64 > 0.8 {
                        result.score += 10.0;
                    }
                }
                None => result.warnings.push("Paths object is empty or invalid".to_string()),
            }
        }

        result.passed = result.errors.is_empty() && result.score >= self.thresholds.openapi_compliance;
        result.message = format!(
            "OpenAPI compliance: {:.1}% ({})",
            result.score,
            verdict(result.passed)
        );
        result.detail("openapi_version", json!(enhanced.spec_version()));
        result.detail("paths_count", json!(enhanced.paths().map_or(0, |p| p.len())));
        result.detail("has_components", json!(spec.get("components").is_some()));
        result
    }

    pub fn performance(&self, elapsed: Duration, baseline: Option<Duration>) -> CheckResult {
        let mut result = CheckResult::new("performance");
        let seconds = elapsed.as_secs_f64();
        let limit = self.thresholds.performance_increase_limit;
        let mut increase = None;

        match baseline.map(|b| b.as_secs_f64()).filter(|b| *b > 0.0) {
            Some(base) => {
                let inc = (seconds - base) / base * 100.0;
                increase = Some(inc);
                result.passed = inc <= limit;
                if !result.passed {
                    result.errors.push(format!(
                        "Performance increase {:.1}% exceeds limit of {}%",
                        inc, limit
                    ));
                }
                result.score = (100.0 - inc / limit * 100.0).clamp(0.0, 100.0);
            }
            None => {
                result.passed = true;
                result.score = if seconds < self.thresholds.unbaselined_fast_seconds {
                    100.0
                } else {
                    80.0
                };
                result
                    .warnings
                    .push("No baseline time provided for performance comparison".to_string());
            }
        }

        result.message = format!("Performance: {:.2}s ({})", seconds, verdict(result.passed));
        result.detail("processing_time_seconds", json!(seconds));
        result.detail("baseline_time_seconds", json!(baseline.map(|b| b.as_secs_f64())));
        result.detail("time_increase_percent", json!(increase));
        result
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

/// All check results of one validation run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    pub overall_average: f64,
}

impl ValidationReport {
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn average_score(&self) -> f64 {
        if self.checks.is_empty() {
            return 0.0;
        }
        self.checks.iter().map(|c| c.score).sum::<f64>() / self.checks.len() as f64
    }

    pub fn all_checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Every check passed and the average clears the overall threshold
    pub fn passed(&self) -> bool {
        self.all_checks_passed() && self.average_score() >= self.overall_average
    }

    pub fn error_count(&self) -> usize {
        self.checks.iter().map(|c| c.errors.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.checks.iter().map(|c| c.warnings.len()).sum()
    }

    /// Human-readable report; `violations_only` hides passed checks
    pub fn render(&self, metrics: Option<&Metrics>, violations_only: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "VALIDATION REPORT");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out);

        for check in &self.checks {
            if violations_only && check.passed {
                continue;
            }
            let marker = if check.passed { "[PASS]" } else { "[FAIL]" };
            let _ = writeln!(out, "{} {}: {}", marker, check.title(), check.message);
            for error in &check.errors {
                let _ = writeln!(out, "   ERROR: {}", error);
            }
            for warning in &check.warnings {
                let _ = writeln!(out, "   WARNING: {}", warning);
            }
            if !check.passed && !check.details.is_empty() {
                let _ = writeln!(out, "   Details:");
                for (key, value) in &check.details {
                    let _ = writeln!(out, "      {}: {}", key, render_detail(value));
                }
            }
            let _ = writeln!(out);
        }

        if violations_only && self.all_checks_passed() {
            let _ = writeln!(out, "NO VIOLATIONS FOUND");
            let _ = writeln!(out, "   All compliance requirements are met.");
            let _ = writeln!(out, "{}", RULE);
        } else {
            let _ = writeln!(out, "{}", RULE);
            let _ = writeln!(
                out,
                "OVERALL RESULT: {} ({:.1}% average)",
                if self.passed() { "PASSED" } else { "FAILED" },
                self.average_score()
            );
            let _ = writeln!(
                out,
                "VIOLATIONS SUMMARY: {} errors, {} warnings",
                self.error_count(),
                self.warning_count()
            );
            let _ = writeln!(out, "{}", RULE);
        }

        if let Some(metrics) = metrics {
            render_metrics(&mut out, metrics);
        }
        out
    }
}

fn render_detail(value: &JsonValue) -> String {
    let text = match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "None".to_string(),
        other => other.to_string(),
    };
    match value {
        JsonValue::Array(items) if text.len() > 100 => format!("list({} items)", items.len()),
        JsonValue::Object(map) if text.len() > 100 => format!("dict({} items)", map.len()),
        _ => text,
    }
}

fn render_metrics(out: &mut String, metrics: &Metrics) {
    let Some(elapsed) = metrics.processing_time() else {
        return;
    };

    let size = match metrics.size_change_percent() {
        Some(change) => format!(
            "{} -> {} bytes ({:+.1}%)",
            group_thousands(metrics.original_size),
            group_thousands(metrics.enhanced_size),
            change
        ),
        None if metrics.enhanced_size > 0 => format!(
            "{} -> {} bytes",
            group_thousands(metrics.original_size),
            group_thousands(metrics.enhanced_size)
        ),
        None => format!("{} bytes", group_thousands(metrics.original_size)),
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "Enhancement Metrics:");
    let _ = writeln!(out, "   Processing Time: {:.2}s", elapsed.as_secs_f64());
    let _ = writeln!(out, "   Operations Processed: {}", metrics.operations_processed);
    let _ = writeln!(out, "   Parameters Fixed: {}", metrics.parameters_fixed);
    let _ = writeln!(out, "   Body Parameters Converted: {}", metrics.body_params_converted);
    let _ = writeln!(out, "   Overlay Actions Applied: {}", metrics.overlay_actions_applied);
    let _ = writeln!(out, "   File Size: {}", size);

    if metrics.total_tokens() > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "LLM Token Usage:");
        for (phase, totals) in [
            ("Generation", metrics.generation_tokens),
            ("Validation", metrics.validation_tokens),
        ] {
            let _ = writeln!(out, "   {} Phase:", phase);
            let _ = writeln!(out, "     Input tokens:  {}", group_thousands(totals.input));
            let _ = writeln!(out, "     Output tokens: {}", group_thousands(totals.output));
            let _ = writeln!(out, "     Total:         {}", group_thousands(totals.total()));
        }
        let _ = writeln!(
            out,
            "   Overall Total:   {} tokens",
            group_thousands(metrics.total_tokens())
        );
    } else if metrics.llm_calls > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out, "LLM Usage:");
        let _ = writeln!(out, "   LLM calls made: {}", metrics.llm_calls);
        let _ = writeln!(out, "   Token tracking: not available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original_swagger() -> OpenApiContext {
        OpenApiContext::from_value(json!({
            "swagger": "2.0",
            "info": {"title": "Items", "version": "1"},
            "paths": {"/items": {"post": {"parameters": [
                {"name": "body", "in": "body", "schema": {"type": "object"}}
            ]}}}
        }))
    }

    fn enhanced() -> OpenApiContext {
        OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "info": {"title": "Items", "version": "1"},
            "servers": [{"url": "https://localhost"}],
            "paths": {"/items": {
                "post": {"parameters": []},
                "get": {"parameters": [
                    {"name": "limit", "in": "query", "schema": {"type": "integer"}},
                    {"name": "session", "in": "cookie"}
                ]}
            }}
        }))
    }

    #[test]
    fn test_converted_swagger_passes_everything() {
        let report = ComplianceValidator::default().run(
            &original_swagger(),
            &enhanced(),
            Some(Duration::from_millis(10)),
            None,
        );
        for check in &report.checks {
            assert!(check.passed, "{} failed: {:?}", check.name, check.errors);
        }
        assert_eq!(report.check("swagger_conversion").map(|c| c.score), Some(100.0));
        assert_eq!(report.check("body_parameter_conversion").map(|c| c.score), Some(100.0));
        assert!(report.passed());
    }

    #[test]
    fn test_leftover_legacy_state_fails() {
        let validator = ComplianceValidator::default();
        let original = original_swagger();

        let conversion = validator.swagger_conversion(&original, &original);
        assert!(!conversion.passed);
        assert_eq!(conversion.score, 30.0);
        assert_eq!(conversion.errors, vec!["Missing 'openapi' field in enhanced spec"]);

        let mut wrong = original_swagger();
        wrong.json["openapi"] = json!("2.5");
        let conversion = validator.swagger_conversion(&original, &wrong);
        assert_eq!(conversion.errors, vec!["Invalid OpenAPI version: 2.5"]);

        let body = validator.body_parameter_conversion(&original, &original);
        assert!(!body.passed);
        assert_eq!(body.score, 0.0);
        assert_eq!(body.errors.len(), 1);
    }

    #[test]
    fn test_parameter_schema_scoring() {
        let spec = OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/a": {"get": {"parameters": [
                {"name": "ok", "in": "query", "schema": {"type": "string"}},
                {"name": "legacy", "in": "query", "type": "string"},
                {"name": "bare", "in": "query"},
                {"name": "untyped", "in": "query", "schema": {"format": "uuid"}}
            ]}}}
        }));
        let result = ComplianceValidator::default().parameter_schemas(&spec);
        assert_eq!(result.score, 50.0);
        assert!(!result.passed);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.message, "Parameter schemas: 2/4 valid (50.0%) (FAIL)");
    }

    #[test]
    fn test_openapi_compliance_structure() {
        let validator = ComplianceValidator::default();
        let result = validator.openapi_compliance(&enhanced());
        assert_eq!(result.score, 100.0);

        let empty = OpenApiContext::from_value(json!({"openapi": "3.0.0", "info": {}, "paths": {}}));
        let result = validator.openapi_compliance(&empty);
        assert_eq!(result.score, 70.0);
        assert!(!result.passed);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_performance_against_baseline() {
        let validator = ComplianceValidator::default();
        let slow = validator.performance(Duration::from_secs(15), Some(Duration::from_secs(10)));
        assert!(!slow.passed);
        assert_eq!(slow.score, 0.0);

        let ok = validator.performance(Duration::from_secs(11), Some(Duration::from_secs(10)));
        assert!(ok.passed);
        assert!((ok.score - 60.0).abs() < 1e-9);

        let unbaselined = validator.performance(Duration::from_secs(90), None);
        assert!(unbaselined.passed);
        assert_eq!(unbaselined.score, 80.0);
        assert_eq!(unbaselined.warnings.len(), 1);
    }

    #[test]
    fn test_render_report() {
        let report = ComplianceValidator::default().run(&original_swagger(), &enhanced(), None, None);
        let mut metrics = Metrics::new();
        metrics.set_processing_time(Duration::from_millis(1500));
        metrics.original_size = 1000;
        metrics.enhanced_size = 1500;
        metrics.llm_calls = 2;

        let text = report.render(Some(&metrics), false);
        assert!(text.starts_with(RULE));
        assert!(text.contains("[PASS] Swagger Conversion: Swagger conversion: 100.0% (PASS)"));
        assert!(text.contains("OVERALL RESULT: PASSED"));
        assert!(text.contains("File Size: 1,000 -> 1,500 bytes (+50.0%)"));
        assert!(text.contains("LLM calls made: 2"));

        let violations = report.render(None, true);
        assert!(violations.contains("NO VIOLATIONS FOUND"));
        assert!(!violations.contains("[PASS]"));
    }

    #[test]
    fn test_check_title() {
        let validator = ComplianceValidator::default();
        let result = validator.openapi_compliance(&enhanced());
        assert_eq!(result.title(), "Openapi Compliance");
    }
}
