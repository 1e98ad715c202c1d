//! Builds an enhancement overlay from a spec.
//!
//! Every operation gets a description action, a summary action when the
//! existing summary is missing or short, and one action per inline parameter.
//! Descriptions come from the LLM bridge when one is configured and fall back
//! to rule-based text per node when a call fails.

// Internal imports (std, crate)
use std::sync::Arc;

// External imports (alphabetized)
use futures::stream::{self, StreamExt};
use serde_json::Value as JsonValue;

use super::{OverlayAction, OverlayDocument, OverlayInfo};
use crate::config::OverlayEnhancements;
use crate::llm::{LlmBridge, TokenUsage};
use crate::openapi::{OpenApiContext, OperationRef};
use crate::prompts::{PromptPair, PromptRegistry};
use crate::utils::{collapse_whitespace, truncate_chars, truncate_with_ellipsis};

/// Default number of LLM calls in flight
pub const DEFAULT_CONCURRENCY: usize = 10;

const RULE_DESCRIPTION_LIMIT: usize = 300;
const SHORT_SUMMARY_LEN: usize = 20;

const OVERLAY_DESCRIPTION: &str = "This overlay enhances the OpenAPI specification with agent-friendly descriptions, use cases, and guidance to improve MCP server tool generation and AI agent understanding.";

/// Counters reported by one generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub operations: usize,
    pub actions: usize,
    pub llm_calls: usize,
    pub llm_failures: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Calls whose token counts were estimated from the word count
    pub estimated_calls: usize,
}

impl GenerationStats {
    fn record(&mut self, usage: TokenUsage) {
        self.llm_calls += 1;
        self.input_tokens += usage.input();
        self.output_tokens += usage.output();
        if usage.is_estimated() {
            self.estimated_calls += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PromptKind {
    Operation,
    Parameter,
}

/// One action to produce; LLM jobs carry their rule-based fallback
enum Job {
    Fixed {
        target: String,
        text: String,
    },
    Llm {
        target: String,
        prompt: PromptKind,
        slots: Vec<(&'static str, String)>,
        fallback: String,
        cap: Option<usize>,
    },
}

struct JobOutcome {
    action: OverlayAction,
    usage: Option<TokenUsage>,
    failed: bool,
}

/// Generates overlay documents for agent-oriented descriptions
pub struct OverlayGenerator {
    settings: OverlayEnhancements,
    llm: Option<Arc<dyn LlmBridge>>,
    prompts: Option<PromptRegistry>,
    concurrency: usize,
}

impl OverlayGenerator {
    pub fn new(settings: OverlayEnhancements) -> Self {
        Self {
            settings,
            llm: None,
            prompts: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Enable LLM-backed descriptions.
    ///
    /// Without a prompt registry the generator stays rule-based.
    pub fn with_llm(mut self, llm: Arc<dyn LlmBridge>, prompts: Option<PromptRegistry>) -> Self {
        if prompts.is_none() {
            log::warn!("No prompt registry available, using rule-based descriptions");
        }
        self.llm = Some(llm);
        self.prompts = prompts;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn llm_active(&self) -> bool {
        self.settings.use_llm && self.llm.is_some() && self.prompts.is_some()
    }

    /// Build the overlay for `spec`; actions follow traversal order
    pub async fn generate(&self, spec: &OpenApiContext) -> (OverlayDocument, GenerationStats) {
        let title = spec.title().unwrap_or("API");
        let mut overlay = OverlayDocument::new(OverlayInfo {
            title: format!("MCP Agent Enhancement Overlay for {}", title),
            version: "1.0.0".to_string(),
            description: Some(OVERLAY_DESCRIPTION.to_string()),
        });
        let mut stats = GenerationStats::default();

        if !self.settings.enabled {
            log::info!("Overlay enhancements disabled, generating an empty overlay");
            return (overlay, stats);
        }

        let operations = spec.operations();
        stats.operations = operations.len();
        let jobs: Vec<Job> = operations
            .iter()
            .flat_map(|op| self.jobs_for(spec, op))
            .collect();

        if self.llm_active() {
            log::info!(
                "Generating {} overlay actions with LLM assistance ({} concurrent)",
                jobs.len(),
                self.concurrency
            );
        }

        let outcomes: Vec<JobOutcome> = stream::iter(jobs)
            .map(|job| self.run(job))
            .buffered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            if let Some(usage) = outcome.usage {
                stats.record(usage);
            }
            if outcome.failed {
                stats.llm_failures += 1;
            }
            overlay.actions.push(outcome.action);
        }
        stats.actions = overlay.actions.len();
        log::info!("Generated {} overlay actions", stats.actions);
        (overlay, stats)
    }

    fn jobs_for(&self, spec: &OpenApiContext, op: &OperationRef<'_>) -> Vec<Job> {
        let mut jobs = Vec::new();
        let base = format!("$.paths['{}'].{}", op.path.replace('\'', "\\'"), op.method);

        if self.settings.enhance_crud_operations {
            let fallback = self.rule_description(spec, op);
            let target = format!("{}.description", base);
            jobs.push(if self.llm_active() {
                Job::Llm {
                    target,
                    prompt: PromptKind::Operation,
                    slots: operation_slots(op),
                    fallback,
                    cap: None,
                }
            } else {
                Job::Fixed { target, text: fallback }
            });
        }

        if self.settings.agentic_focus {
            let summary = op.summary().unwrap_or("");
            if summary.chars().count() < SHORT_SUMMARY_LEN {
                jobs.push(Job::Fixed {
                    target: format!("{}.summary", base),
                    text: operation_purpose(op),
                });
            }
        }

        if self.settings.enhance_parameters {
            let context = format!(
                "{} {} - {}",
                op.method.to_uppercase(),
                op.path,
                op.summary().unwrap_or("")
            );
            for (idx, param) in op.parameters().iter().enumerate() {
                if param.get("$ref").is_some() {
                    continue;
                }
                let target = format!("{}.parameters[{}].description", base, idx);
                let fallback = self.rule_parameter_description(param);
                jobs.push(if self.llm_active() {
                    Job::Llm {
                        target,
                        prompt: PromptKind::Parameter,
                        slots: parameter_slots(param, &context),
                        fallback,
                        cap: Some(self.settings.max_description_length),
                    }
                } else {
                    Job::Fixed { target, text: fallback }
                });
            }
        }
        jobs
    }

    async fn run(&self, job: Job) -> JobOutcome {
        let (target, prompt, slots, fallback, cap) = match job {
            Job::Fixed { target, text } => {
                return JobOutcome {
                    action: OverlayAction::update(target, text),
                    usage: None,
                    failed: false,
                }
            }
            Job::Llm {
                target,
                prompt,
                slots,
                fallback,
                cap,
            } => (target, prompt, slots, fallback, cap),
        };

        let (Some(llm), Some(pair)) = (&self.llm, self.prompt_pair(prompt)) else {
            return JobOutcome {
                action: OverlayAction::update(target, fallback),
                usage: None,
                failed: false,
            };
        };

        let (system, user) = pair.render(&slots);
        match llm.complete(&system, &user).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let text = response.content.trim();
                let text = match cap {
                    Some(max) => truncate_with_ellipsis(text, max),
                    None => text.to_string(),
                };
                log::debug!("LLM enhanced {}", target);
                JobOutcome {
                    action: OverlayAction::update(target, text),
                    usage: Some(response.usage),
                    failed: false,
                }
            }
            Ok(response) => {
                log::warn!("LLM returned an empty answer for {}, using rule-based text", target);
                JobOutcome {
                    action: OverlayAction::update(target, fallback),
                    usage: Some(response.usage),
                    failed: true,
                }
            }
            Err(e) => {
                log::warn!("LLM enhancement failed for {}: {}, using rule-based text", target, e);
                JobOutcome {
                    action: OverlayAction::update(target, fallback),
                    usage: None,
                    failed: true,
                }
            }
        }
    }

    fn prompt_pair(&self, kind: PromptKind) -> Option<&PromptPair> {
        let prompts = self.prompts.as_ref()?;
        Some(match kind {
            PromptKind::Operation => &prompts.operation_description,
            PromptKind::Parameter => &prompts.parameter_description,
        })
    }

    /// Purpose sentence, optional use case and a short required-parameter list
    fn rule_description(&self, spec: &OpenApiContext, op: &OperationRef<'_>) -> String {
        let mut description = operation_purpose(op);

        if self.settings.add_use_cases {
            if let Some(first) = use_cases(op).first() {
                description.push_str(" Use when: ");
                description.push_str(&first.to_lowercase());
            }
        }

        let required: Vec<String> = op
            .parameters()
            .iter()
            .map(|p| spec.resolve(p))
            .filter(|p| p.get("required").and_then(JsonValue::as_bool).unwrap_or(false))
            .map(|p| {
                p.get("name")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("unknown")
                    .to_string()
            })
            .collect();
        if !required.is_empty() && required.len() <= 3 {
            description.push_str(". Required: ");
            description.push_str(&required.join(", "));
        }

        truncate_with_ellipsis(&description, RULE_DESCRIPTION_LIMIT)
    }

    fn rule_parameter_description(&self, param: &JsonValue) -> String {
        if let Some(original) = param.get("description").and_then(JsonValue::as_str) {
            let cleaned = collapse_whitespace(original);
            if !cleaned.is_empty() {
                return cleaned;
            }
        }

        let name = param
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_lowercase();
        if self.settings.add_parameter_guidance {
            if let Some(stock) = stock_parameter_description(&name) {
                return stock.to_string();
            }
        }

        let required = param.get("required").and_then(JsonValue::as_bool).unwrap_or(false);
        format!(
            "{} {} parameter",
            if required { "Required" } else { "Optional" },
            parameter_type(param)
        )
    }
}

fn stock_parameter_description(name: &str) -> Option<&'static str> {
    let has = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));
    if has(&["namespace", "ns"]) {
        Some("Kubernetes namespace to scope the operation")
    } else if has(&["limit", "max"]) {
        Some("Maximum number of results to return")
    } else if has(&["offset", "skip", "continue"]) {
        Some("Pagination token or offset for retrieving more results")
    } else if has(&["selector", "filter"]) {
        Some("Filter to narrow results based on labels or fields")
    } else if name.contains("name") && !name.contains("prefix") {
        Some("Name of the resource to operate on")
    } else {
        None
    }
}

/// Legacy `type`, then `schema.type`, else `string`
fn parameter_type(param: &JsonValue) -> &str {
    param
        .get("type")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            param
                .get("schema")
                .and_then(|s| s.get("type"))
                .and_then(JsonValue::as_str)
        })
        .unwrap_or("string")
}

/// Last literal path segment, `resource` when there is none
fn resource_name(path: &str) -> &str {
    path.split('/')
        .filter(|p| !p.is_empty() && !p.starts_with('{'))
        .last()
        .unwrap_or("resource")
}

/// One-sentence purpose derived from method, path shape and operationId
pub fn operation_purpose(op: &OperationRef<'_>) -> String {
    let resource = resource_name(op.path);
    let op_id = op.operation_id().unwrap_or("").to_lowercase();
    let placeholders = op.path.matches('{').count();

    match op.method {
        "get" if placeholders == 1 => format!("Retrieve details of a specific {}", resource),
        "get" if op_id.contains("list") || placeholders == 0 => format!("List or query {}", resource),
        "get" => format!("Retrieve {} information", resource),
        "post" if op_id.contains("create") => format!("Create a new {}", resource),
        "post" if op_id.contains("search") || op_id.contains("query") => {
            format!("Search or query {}", resource)
        }
        "post" => format!("Perform an operation on {}", resource),
        "put" => format!("Update or replace a {}", resource),
        "patch" => format!("Partially update a {}", resource),
        "delete" => format!("Delete a {}", resource),
        method => match op.summary().filter(|s| !s.is_empty()) {
            Some(summary) => summary.to_string(),
            None => format!("Perform {} operation on {}", method.to_uppercase(), op.path),
        },
    }
}

/// Up to three scenarios in which an agent would call the operation
pub fn use_cases(op: &OperationRef<'_>) -> Vec<&'static str> {
    let op_id = op.operation_id().unwrap_or("").to_lowercase();
    let method = op.method;
    let mut cases = Vec::new();

    if op_id.contains("list") && method == "get" {
        cases.push("When you need to discover available resources or check what exists");
        cases.push("To monitor or audit resource states across the system");
    }
    if op_id.contains("get") && op.path.contains('{') {
        cases.push("When you have a specific resource identifier and need its current details");
        cases.push("To verify the state or configuration of a particular resource");
    }
    if op_id.contains("create") || method == "post" {
        cases.push("When initializing new resources based on user requirements");
        cases.push("To provision resources as part of a workflow or automation");
    }
    if op_id.contains("update") || method == "put" || method == "patch" {
        cases.push("When modifying existing resource configurations or properties");
        cases.push("To fix issues or adjust settings based on changing requirements");
    }
    if op_id.contains("delete") || method == "delete" {
        cases.push("When cleaning up resources that are no longer needed");
        cases.push("To remove failed or obsolete resources");
    }
    if op.path.contains("log") || op_id.contains("log") {
        cases.push("For debugging issues or understanding resource behavior");
        cases.push("When investigating errors or tracking execution history");
    }
    if op.path.contains("status") || op_id.contains("status") {
        cases.push("To check the health or state of resources");
        cases.push("When monitoring progress or waiting for operations to complete");
    }

    cases.truncate(3);
    cases
}

fn operation_slots(op: &OperationRef<'_>) -> Vec<(&'static str, String)> {
    let names_in = |location: &str| {
        let names: Vec<&str> = op
            .parameters()
            .iter()
            .filter(|p| p.get("in").and_then(JsonValue::as_str) == Some(location))
            .filter_map(|p| p.get("name").and_then(JsonValue::as_str))
            .collect();
        if names.is_empty() {
            "None".to_string()
        } else {
            names.join(", ")
        }
    };
    let or_none = |s: Option<&str>, max: usize| match s.filter(|s| !s.is_empty()) {
        Some(s) => truncate_chars(s, max),
        None => "None".to_string(),
    };

    vec![
        ("method", op.method.to_uppercase()),
        ("path", op.path.to_string()),
        ("operation_id", op.operation_id().unwrap_or("").to_string()),
        ("summary", or_none(op.summary(), usize::MAX)),
        ("description", or_none(op.description(), 200)),
        ("path_params", names_in("path")),
        ("query_params", names_in("query")),
        (
            "has_body",
            if op.request_body().is_some() { "Yes" } else { "No" }.to_string(),
        ),
    ]
}

fn parameter_slots(param: &JsonValue, context: &str) -> Vec<(&'static str, String)> {
    let text = |key: &str| param.get(key).and_then(JsonValue::as_str).unwrap_or("");
    let description = text("description");
    let required = param.get("required").and_then(JsonValue::as_bool).unwrap_or(false);
    vec![
        ("param_name", text("name").to_string()),
        ("param_in", text("in").to_string()),
        ("param_type", parameter_type(param).to_string()),
        ("param_required", if required { "Yes" } else { "No" }.to_string()),
        (
            "param_description",
            if description.is_empty() {
                "None".to_string()
            } else {
                truncate_chars(description, 100)
            },
        ),
        ("operation_context", truncate_chars(context, 50)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::llm::ChatMessage;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn spec() -> OpenApiContext {
        OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "info": {"title": "Pets", "version": "1.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "summary": "List all pets in the store",
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer"}},
                            {"$ref": "#/components/parameters/Trace"}
                        ]
                    },
                    "post": {"operationId": "createPet", "requestBody": {"content": {}}}
                },
                "/pets/{petId}": {
                    "delete": {
                        "operationId": "deletePet",
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true,
                             "description": "  The   pet id ", "schema": {"type": "integer"}}
                        ]
                    }
                }
            },
            "components": {"parameters": {"Trace": {"name": "trace", "in": "header"}}}
        }))
    }

    fn rule_based() -> OverlayEnhancements {
        OverlayEnhancements {
            use_llm: false,
            ..OverlayEnhancements::default()
        }
    }

    fn targets(doc: &OverlayDocument) -> Vec<&str> {
        doc.actions.iter().map(|a| a.target.as_str()).collect()
    }

    fn text(doc: &OverlayDocument, target: &str) -> String {
        doc.actions
            .iter()
            .find(|a| a.target == target)
            .and_then(|a| a.update.as_ref())
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_rule_based_overlay() {
        let (doc, stats) = OverlayGenerator::new(rule_based()).generate(&spec()).await;

        assert_eq!(doc.info.title, "MCP Agent Enhancement Overlay for Pets");
        assert_eq!(
            targets(&doc),
            vec![
                "$.paths['/pets'].get.description",
                "$.paths['/pets'].get.parameters[0].description",
                "$.paths['/pets'].post.description",
                "$.paths['/pets'].post.summary",
                "$.paths['/pets/{petId}'].delete.description",
                "$.paths['/pets/{petId}'].delete.summary",
                "$.paths['/pets/{petId}'].delete.parameters[0].description",
            ]
        );
        assert_eq!(
            text(&doc, "$.paths['/pets'].get.description"),
            "List or query pets Use when: when you need to discover available resources or check what exists"
        );
        assert_eq!(
            text(&doc, "$.paths['/pets'].get.parameters[0].description"),
            "Maximum number of results to return"
        );
        assert_eq!(text(&doc, "$.paths['/pets'].post.summary"), "Create a new pets");
        assert_eq!(
            text(&doc, "$.paths['/pets/{petId}'].delete.description"),
            "Delete a pets Use when: when cleaning up resources that are no longer needed. Required: petId"
        );
        assert_eq!(
            text(&doc, "$.paths['/pets/{petId}'].delete.parameters[0].description"),
            "The pet id"
        );
        assert_eq!(stats.operations, 3);
        assert_eq!(stats.actions, 7);
        assert_eq!(stats.llm_calls, 0);
    }

    #[tokio::test]
    async fn test_disabled_toggles() {
        let settings = OverlayEnhancements {
            enhance_parameters: false,
            agentic_focus: false,
            add_use_cases: false,
            ..rule_based()
        };
        let (doc, _) = OverlayGenerator::new(settings).generate(&spec()).await;
        assert_eq!(doc.actions.len(), 3);
        assert_eq!(text(&doc, "$.paths['/pets'].get.description"), "List or query pets");

        let off = OverlayEnhancements {
            enabled: false,
            ..OverlayEnhancements::default()
        };
        let (doc, stats) = OverlayGenerator::new(off).generate(&spec()).await;
        assert!(doc.actions.is_empty());
        assert_eq!(stats, GenerationStats::default());
    }

    #[tokio::test]
    async fn test_llm_path_with_fallback_per_node() -> crate::Result<()> {
        let llm = Arc::new(ScriptedLlm::new(|messages: &[ChatMessage]| {
            let user = &messages[1].content;
            if user.contains("deletePet") {
                Err(crate::Error::llm("boom"))
            } else if user.starts_with("Parameter:") {
                Ok("x".repeat(50))
            } else {
                Ok("  Lists pets for browsing.  ".to_string())
            }
        }));
        let settings = OverlayEnhancements {
            max_description_length: 20,
            ..OverlayEnhancements::default()
        };
        let generator = OverlayGenerator::new(settings)
            .with_llm(llm.clone(), Some(PromptRegistry::builtin()?))
            .with_concurrency(2);
        let (doc, stats) = generator.generate(&spec()).await;

        assert_eq!(text(&doc, "$.paths['/pets'].get.description"), "Lists pets for browsing.");
        let param = text(&doc, "$.paths['/pets'].get.parameters[0].description");
        assert_eq!(param.chars().count(), 20);
        assert!(param.ends_with("..."));
        assert!(text(&doc, "$.paths['/pets/{petId}'].delete.description").starts_with("Delete a pets"));

        assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
        assert_eq!(stats.llm_calls, 4);
        assert_eq!(stats.llm_failures, 1);
        assert_eq!(stats.input_tokens, 40);
        assert_eq!(stats.output_tokens, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_without_prompts_stays_rule_based() {
        let llm = Arc::new(ScriptedLlm::new(|_: &[ChatMessage]| Ok("llm".to_string())));
        let generator = OverlayGenerator::new(OverlayEnhancements::default()).with_llm(llm.clone(), None);
        let (doc, stats) = generator.generate(&spec()).await;
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.llm_calls, 0);
        assert!(text(&doc, "$.paths['/pets'].get.description").starts_with("List or query"));
    }

    #[test]
    fn test_stock_parameter_descriptions() {
        let generator = OverlayGenerator::new(rule_based());
        let describe = |p: JsonValue| generator.rule_parameter_description(&p);
        assert_eq!(
            describe(json!({"name": "namespace"})),
            "Kubernetes namespace to scope the operation"
        );
        assert_eq!(
            describe(json!({"name": "continue"})),
            "Pagination token or offset for retrieving more results"
        );
        assert_eq!(
            describe(json!({"name": "labelSelector"})),
            "Filter to narrow results based on labels or fields"
        );
        assert_eq!(describe(json!({"name": "podName"})), "Name of the resource to operate on");
        assert_eq!(
            describe(json!({"name": "namePrefix", "required": true, "type": "string"})),
            "Required string parameter"
        );
        assert_eq!(
            describe(json!({"name": "verbose", "schema": {"type": "boolean"}})),
            "Optional boolean parameter"
        );
    }

    #[test]
    fn test_operation_purpose_variants() {
        let doc = json!({"operationId": "searchItems", "summary": "Find"});
        let item = JsonValue::Null;
        let op = |path: &'static str, method: &'static str| OperationRef {
            path,
            method,
            operation: &doc,
            path_item: &item,
        };
        assert_eq!(operation_purpose(&op("/items", "post")), "Search or query items");
        assert_eq!(
            operation_purpose(&op("/a/{x}/b/{y}", "get")),
            "Retrieve b information"
        );
        assert_eq!(operation_purpose(&op("/{id}", "put")), "Update or replace a resource");
        assert_eq!(operation_purpose(&op("/items", "head")), "Find");
    }

    #[test]
    fn test_use_cases_capped_at_three() {
        let doc = json!({"operationId": "getLogStatus"});
        let item = JsonValue::Null;
        let op = OperationRef {
            path: "/pods/{name}/log",
            method: "get",
            operation: &doc,
            path_item: &item,
        };
        let cases = use_cases(&op);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[2], "For debugging issues or understanding resource behavior");
    }
}
