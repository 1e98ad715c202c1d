//! Emits the Python MCP project for an enhanced spec.
//!
//! Layout under the output directory:
//!
//! ```text
//! mcp_<name>/api/client.py
//! mcp_<name>/models/base.py and one module per schema
//! mcp_<name>/tools/<path_module>.py
//! mcp_<name>/server.py
//! pyproject.toml
//! .env.example, README.md           (without the agent)
//! agent_<name>/__init__.py, prompts.py  (with the agent)
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::sync::Arc;

// External imports (alphabetized)
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::config::CodegenConfig;
use crate::extract::{ParamDoc, ParamLocation, ParameterExtractor, ToolFunction};
use crate::llm::{LlmBridge, TokenUsage};
use crate::openapi::OpenApiContext;
use crate::overlay::generator::DEFAULT_CONCURRENCY;
use crate::prompts::PromptRegistry;
use crate::templates::{Rendered, TemplateRenderer};
use crate::types::PythonTypeMapper;
use crate::utils::{
    collapse_whitespace, path_to_module_name, python_identifier, to_snake_case,
    to_upper_camel_case,
};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const PYTHON_KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Names derived from the API title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNames {
    pub title: String,
    /// snake_case stem shared by every package
    pub name: String,
    /// `mcp_<name>`
    pub package: String,
    /// `agent_<name>`
    pub agent_package: String,
    /// Prefix of the generated environment variables
    pub env_prefix: String,
}

impl ProjectNames {
    pub fn new(spec: &OpenApiContext, config: &CodegenConfig) -> Self {
        let title = config
            .title
            .clone()
            .or_else(|| spec.title().map(String::from))
            .unwrap_or_else(|| "Generated API".to_string());
        let name = identifier_stem(&to_snake_case(&title), "api");
        Self {
            package: format!("mcp_{}", name),
            agent_package: format!("agent_{}", name),
            env_prefix: name.to_uppercase(),
            title,
            name,
        }
    }
}

/// Tool module entry of the registration map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRegistration {
    pub module: String,
    pub functions: Vec<String>,
}

/// What an emission run produced
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    pub package: String,
    pub package_dir: PathBuf,
    /// Files written, or that would be written in dry-run mode
    pub files: Vec<PathBuf>,
    /// Files whose emission failed, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Registration map in emission order
    pub registrations: Vec<ModuleRegistration>,
    pub llm_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl EmitReport {
    pub fn tool_count(&self) -> usize {
        self.registrations.iter().map(|m| m.functions.len()).sum()
    }

    fn record_usage(&mut self, usage: TokenUsage) {
        self.llm_calls += 1;
        self.input_tokens += usage.input();
        self.output_tokens += usage.output();
    }

    fn record(&mut self, path: &Path, rendered: Rendered) {
        if let Rendered::FormatFailed(reason) = rendered {
            if path.extension().map_or(false, |e| e == "py") {
                log::error!("Formatting failed for {}: {}", path.display(), reason);
                self.failed.push((path.to_path_buf(), reason));
            }
        }
        self.files.push(path.to_path_buf());
    }
}

/// Operations sharing one tool module
struct ToolModule {
    stem: String,
    paths: Vec<String>,
    functions: Vec<ToolFunction>,
}

/// Docstrings produced for one module; `None` keeps the original
struct ModuleDocstrings {
    docs: Vec<Option<String>>,
    usage: Vec<TokenUsage>,
}

#[derive(Serialize)]
struct QueryView {
    name: String,
    key: String,
    is_bool: bool,
    /// Optional flag defaulting to `False`; sent only when set
    omit_false: bool,
}

#[derive(Serialize)]
struct BodyView {
    name: String,
    key: String,
}

#[derive(Serialize)]
struct FunctionView {
    name: String,
    signature: String,
    docstring: String,
    params_info: Vec<ParamDoc>,
    method: String,
    http_path: String,
    formatted_path: String,
    query: Vec<QueryView>,
    body: Vec<BodyView>,
    root_body: Option<String>,
}

impl FunctionView {
    fn new(function: &ToolFunction, enhanced: Option<&str>) -> Self {
        let docstring = [
            function.description.as_str(),
            enhanced.unwrap_or_default(),
            function.summary.as_str(),
        ]
        .into_iter()
        .find(|text| !text.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", function.method, function.http_path));

        let params_info = function
            .params_info()
            .into_iter()
            .zip(&function.params)
            .map(|(mut doc, param)| {
                if doc.description.trim().is_empty() {
                    doc.description = match param.location {
                        ParamLocation::Path => format!("Path parameter '{}'", param.key),
                        ParamLocation::Query => format!("Query parameter '{}'", param.key),
                        ParamLocation::Body if param.key.is_empty() => "Request body".to_string(),
                        ParamLocation::Body => format!("Request body field '{}'", param.key),
                    };
                } else {
                    doc.description = collapse_whitespace(&doc.description);
                }
                doc
            })
            .collect();

        let query = function
            .params
            .iter()
            .filter(|p| p.location == ParamLocation::Query)
            .map(|p| QueryView {
                name: p.name.clone(),
                key: p.key.clone(),
                is_bool: p.py_type == "bool",
                omit_false: p.py_type == "bool" && p.default.is_some(),
            })
            .collect();
        let body_params: Vec<_> = function
            .params
            .iter()
            .filter(|p| p.location == ParamLocation::Body)
            .collect();
        let root_body = body_params
            .iter()
            .find(|p| p.key.is_empty())
            .map(|p| p.name.clone());
        let body = body_params
            .iter()
            .filter(|p| !p.key.is_empty())
            .map(|p| BodyView {
                name: p.name.clone(),
                key: p.key.clone(),
            })
            .collect();

        Self {
            name: function.name.clone(),
            signature: function.signatures().join(", "),
            docstring,
            params_info,
            method: function.method.clone(),
            http_path: function.http_path.clone(),
            formatted_path: function.formatted_path.clone(),
            query,
            body,
            root_body,
        }
    }
}

#[derive(Serialize)]
struct FieldView {
    name: String,
    #[serde(rename = "type")]
    py_type: String,
    required: bool,
    alias: Option<String>,
    description: String,
}

/// Renders the project for one spec
pub struct ProjectEmitter<'a> {
    spec: &'a OpenApiContext,
    config: &'a CodegenConfig,
    renderer: &'a TemplateRenderer,
    llm: Option<Arc<dyn LlmBridge>>,
    prompts: Option<PromptRegistry>,
    concurrency: usize,
}

impl<'a> ProjectEmitter<'a> {
    pub fn new(spec: &'a OpenApiContext, config: &'a CodegenConfig, renderer: &'a TemplateRenderer) -> Self {
        Self {
            spec,
            config,
            renderer,
            llm: None,
            prompts: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// LLM used for docstring enhancement and the agent system prompt
    pub fn with_llm(mut self, llm: Arc<dyn LlmBridge>, prompts: Option<PromptRegistry>) -> Self {
        self.llm = Some(llm);
        self.prompts = prompts;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn names(&self) -> ProjectNames {
        ProjectNames::new(self.spec, self.config)
    }

    pub async fn emit(&self, output_dir: &Path) -> crate::Result<EmitReport> {
        let names = self.names();
        let package_dir = output_dir.join(&names.package);
        log::info!(
            "Generating MCP project {} in {}",
            names.package,
            output_dir.display()
        );

        let mut report = EmitReport {
            package: names.package.clone(),
            package_dir: package_dir.clone(),
            ..EmitReport::default()
        };
        let base_url = self
            .spec
            .base_path()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        self.core(
            &mut report,
            "client.py.tera",
            &package_dir.join("api").join("client.py"),
            &json!({"title": names.title, "base_url": base_url, "env_prefix": names.env_prefix}),
        )
        .await?;
        self.core(
            &mut report,
            "init.py.tera",
            &package_dir.join("api").join("__init__.py"),
            &json!({"doc": "HTTP client for the API.", "exports": []}),
        )
        .await?;

        self.emit_models(&mut report, &names, &package_dir).await?;

        let modules = self.collect_modules();
        let docstrings = self.enhance_docstrings(&modules).await;
        for (module, docs) in modules.iter().zip(docstrings) {
            for usage in docs.usage {
                report.record_usage(usage);
            }
            let functions: Vec<FunctionView> = module
                .functions
                .iter()
                .zip(docs.docs.iter())
                .map(|(f, doc)| FunctionView::new(f, doc.as_deref()))
                .collect();
            let path = package_dir.join("tools").join(format!("{}.py", module.stem));
            self.core(
                &mut report,
                "tool.py.tera",
                &path,
                &json!({
                    "path": module.paths.join(", "),
                    "package": names.package,
                    "functions": functions,
                }),
            )
            .await?;
            report.registrations.push(ModuleRegistration {
                module: module.stem.clone(),
                functions: module.functions.iter().map(|f| f.name.clone()).collect(),
            });
        }

        let module_names: Vec<String> = report.registrations.iter().map(|m| m.module.clone()).collect();
        self.core(
            &mut report,
            "init.py.tera",
            &package_dir.join("tools").join("__init__.py"),
            &json!({"doc": format!("Tool modules for the {} API.", names.title), "exports": module_names}),
        )
        .await?;

        let modules_ctx = report.registrations.clone();
        self.core(
            &mut report,
            "server.py.tera",
            &package_dir.join("server.py"),
            &json!({
                "title": names.title,
                "package": names.package,
                "server_name": format!("{} MCP Server", names.title),
                "modules": modules_ctx,
            }),
        )
        .await?;
        self.core(
            &mut report,
            "init.py.tera",
            &package_dir.join("__init__.py"),
            &json!({
                "doc": format!("{} MCP server package.", names.title),
                "version": self.config.version,
                "exports": [],
            }),
        )
        .await?;

        let mut packages = vec![names.package.clone()];
        if self.config.generate_agent {
            packages.push(names.agent_package.clone());
        }
        let description = self
            .config
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP server for the {} API", names.title));
        self.core(
            &mut report,
            "pyproject.toml.tera",
            &output_dir.join("pyproject.toml"),
            &json!({
                "package": names.package,
                "version": self.config.version,
                "description": description,
                "author": self.config.author,
                "email": self.config.email,
                "license": self.config.license,
                "python_version": self.config.python_version,
                "packages": packages,
            }),
        )
        .await?;

        if self.config.generate_agent {
            self.emit_agent(&mut report, &names, output_dir, &modules).await;
        } else {
            self.auxiliary(
                &mut report,
                "env.example.tera",
                &output_dir.join(".env.example"),
                &json!({"env_prefix": names.env_prefix, "base_url": base_url}),
            )
            .await;
            let tools: Vec<JsonValue> = modules
                .iter()
                .flat_map(|m| &m.functions)
                .map(|f| {
                    json!({
                        "name": f.name,
                        "method": f.method,
                        "path": f.http_path,
                        "description": collapse_whitespace(if f.description.is_empty() { &f.summary } else { &f.description }),
                    })
                })
                .collect();
            self.auxiliary(
                &mut report,
                "README.md.tera",
                &output_dir.join("README.md"),
                &json!({
                    "title": names.title,
                    "description": description,
                    "package": names.package,
                    "tools": tools,
                }),
            )
            .await;
        }
        if self.config.generate_eval {
            log::warn!("Evaluation harness generation is not supported, skipping");
        }

        log::info!(
            "Generated {} tools in {} modules ({} files)",
            report.tool_count(),
            report.registrations.len(),
            report.files.len()
        );
        Ok(report)
    }

    /// Group operations by tool module, keeping document order
    fn collect_modules(&self) -> Vec<ToolModule> {
        let extractor = ParameterExtractor::new(self.spec);
        let mut modules: Vec<ToolModule> = Vec::new();
        for op in self.spec.operations() {
            let stem = identifier_stem(&path_to_module_name(op.path), "path");
            let function = extractor.extract(&op);
            let index = match modules.iter().position(|m| m.stem == stem) {
                Some(index) => index,
                None => {
                    modules.push(ToolModule {
                        stem,
                        paths: Vec::new(),
                        functions: Vec::new(),
                    });
                    modules.len() - 1
                }
            };
            let module = &mut modules[index];
            if !module.paths.iter().any(|p| p == op.path) {
                module.paths.push(op.path.to_string());
            }
            module.functions.push(function);
        }
        modules
    }

    async fn emit_models(
        &self,
        report: &mut EmitReport,
        names: &ProjectNames,
        package_dir: &Path,
    ) -> crate::Result<()> {
        let models_dir = package_dir.join("models");
        self.core(
            report,
            "models_base.py.tera",
            &models_dir.join("base.py"),
            &json!({"title": names.title}),
        )
        .await?;

        let types = PythonTypeMapper::new(self.spec);
        let mut stems = vec!["base".to_string()];
        for (schema_name, schema) in self.spec.schemas().into_iter().flatten() {
            let schema = self.spec.resolve_schema(schema);
            let model_class = class_name(schema_name);
            let stem = identifier_stem(&to_snake_case(schema_name), "model");

            let required: Vec<&str> = schema
                .get("required")
                .and_then(JsonValue::as_array)
                .map(|r| r.iter().filter_map(JsonValue::as_str).collect())
                .unwrap_or_default();
            let fields: Vec<FieldView> = schema
                .get("properties")
                .and_then(JsonValue::as_object)
                .into_iter()
                .flatten()
                .map(|(prop, prop_schema)| {
                    let name = field_name(prop);
                    FieldView {
                        alias: (name != *prop).then(|| prop.clone()),
                        name,
                        py_type: types.map(prop_schema),
                        required: required.contains(&prop.as_str()),
                        description: prop_schema
                            .get("description")
                            .and_then(JsonValue::as_str)
                            .map(collapse_whitespace)
                            .unwrap_or_default(),
                    }
                })
                .collect();
            let description = schema
                .get("description")
                .and_then(JsonValue::as_str)
                .map(collapse_whitespace)
                .unwrap_or_else(|| format!("{} model", model_class));

            self.core(
                report,
                "model.py.tera",
                &models_dir.join(format!("{}.py", stem)),
                &json!({
                    "schema_name": schema_name,
                    "class_name": model_class,
                    "description": description,
                    "fields": fields,
                }),
            )
            .await?;
            stems.push(stem);
        }

        self.core(
            report,
            "init.py.tera",
            &models_dir.join("__init__.py"),
            &json!({"doc": "Data models for the API.", "exports": stems}),
        )
        .await
    }

    async fn emit_agent(
        &self,
        report: &mut EmitReport,
        names: &ProjectNames,
        output_dir: &Path,
        modules: &[ToolModule],
    ) {
        let agent_dir = output_dir.join(&names.agent_package);
        let tools: Vec<&ToolFunction> = modules.iter().flat_map(|m| &m.functions).collect();
        let system_prompt = match self.llm_system_prompt(&names.title, &tools).await {
            Some((prompt, usage)) => {
                report.record_usage(usage);
                prompt
            }
            None => fallback_system_prompt(&names.title, &tools),
        };
        let tool_names: Vec<&str> = tools.iter().map(|f| f.name.as_str()).collect();

        self.auxiliary(
            report,
            "agent_init.py.tera",
            &agent_dir.join("__init__.py"),
            &json!({
                "title": names.title,
                "package": names.package,
                "agent_package": names.agent_package,
            }),
        )
        .await;
        self.auxiliary(
            report,
            "agent_prompts.py.tera",
            &agent_dir.join("prompts.py"),
            &json!({"title": names.title, "system_prompt": system_prompt, "tools": tool_names}),
        )
        .await;
    }

    async fn llm_system_prompt(&self, title: &str, tools: &[&ToolFunction]) -> Option<(String, TokenUsage)> {
        let llm = self.llm.as_ref()?;
        let pair = self.prompts.as_ref()?.agent_system_prompt.as_ref()?;
        let listing = tools
            .iter()
            .map(|f| format!("- {}: {}", f.name, tool_summary(f)))
            .collect::<Vec<_>>()
            .join("\n");
        let (system, user) = pair.render(&[("title", title.to_string()), ("tools", listing)]);
        match llm.complete(&system, &user).await {
            Ok(response) if !response.content.trim().is_empty() => {
                Some((response.content.trim().to_string(), response.usage))
            }
            Ok(_) => {
                log::warn!("LLM returned an empty agent system prompt, using the tool listing");
                None
            }
            Err(e) => {
                log::warn!("Agent system prompt generation failed: {}, using the tool listing", e);
                None
            }
        }
    }

    async fn enhance_docstrings(&self, modules: &[ToolModule]) -> Vec<ModuleDocstrings> {
        let active = self.config.overlay_enhancements.enhance_docstrings
            && self.config.overlay_enhancements.use_llm
            && self.llm.is_some()
            && self
                .prompts
                .as_ref()
                .map_or(false, |p| p.tool_docstring.is_some());
        if !active {
            return modules
                .iter()
                .map(|m| ModuleDocstrings {
                    docs: vec![None; m.functions.len()],
                    usage: Vec::new(),
                })
                .collect();
        }

        stream::iter(modules)
            .map(|module| self.enhance_module(module))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn enhance_module(&self, module: &ToolModule) -> ModuleDocstrings {
        let mut out = ModuleDocstrings {
            docs: Vec::with_capacity(module.functions.len()),
            usage: Vec::new(),
        };
        let pair = self.prompts.as_ref().and_then(|p| p.tool_docstring.as_ref());
        for function in &module.functions {
            let (Some(llm), Some(pair)) = (&self.llm, pair) else {
                out.docs.push(None);
                continue;
            };
            if !function.description.trim().is_empty() {
                out.docs.push(None);
                continue;
            }
            let (system, user) = pair.render(&[
                ("function_name", function.name.clone()),
                ("method", function.method.clone()),
                ("path", function.http_path.clone()),
                ("params", function.signatures().join(", ")),
            ]);
            match llm.complete(&system, &user).await {
                Ok(response) => {
                    let text = collapse_whitespace(&response.content);
                    out.usage.push(response.usage);
                    out.docs.push((!text.is_empty()).then_some(text));
                }
                Err(e) => {
                    log::warn!("Docstring enhancement failed for {}: {}", function.name, e);
                    out.docs.push(None);
                }
            }
        }
        out
    }

    /// Render a file the project cannot work without
    async fn core<T: Serialize>(
        &self,
        report: &mut EmitReport,
        template: &str,
        path: &Path,
        context: &T,
    ) -> crate::Result<()> {
        let rendered = self
            .renderer
            .render(template, path, context)
            .await
            .map_err(|e| crate::Error::emission(path, e))?;
        report.record(path, rendered);
        Ok(())
    }

    /// Render a file whose failure is logged and skipped
    async fn auxiliary<T: Serialize>(
        &self,
        report: &mut EmitReport,
        template: &str,
        path: &Path,
        context: &T,
    ) {
        match self.renderer.render(template, path, context).await {
            Ok(rendered) => report.record(path, rendered),
            Err(e) => {
                log::error!("Failed to render {}: {}", path.display(), e);
                report.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
}

fn tool_summary(function: &ToolFunction) -> String {
    let text = if function.summary.is_empty() {
        &function.description
    } else {
        &function.summary
    };
    match collapse_whitespace(text) {
        s if s.is_empty() => format!("{} {}", function.method, function.http_path),
        s => s,
    }
}

/// System prompt listing every registered tool
pub fn fallback_system_prompt(title: &str, tools: &[&ToolFunction]) -> String {
    let mut prompt = format!(
        "You are an assistant for the {} API. Use the available tools to fulfil requests and report results accurately. Available tools:",
        title
    );
    for function in tools {
        prompt.push_str(&format!("\n- {}: {}", function.name, tool_summary(function)));
    }
    prompt
}

/// Identifier-safe snake_case stem; a leading digit gets `prefix_`
fn identifier_stem(raw: &str, prefix: &str) -> String {
    let ident = python_identifier(raw);
    let collapsed = ident
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    match collapsed.chars().next() {
        None => prefix.to_string(),
        Some(c) if c.is_ascii_digit() => format!("{}_{}", prefix, collapsed),
        Some(_) => collapsed,
    }
}

fn class_name(schema_name: &str) -> String {
    let name = python_identifier(&to_upper_camel_case(schema_name));
    match name.chars().next() {
        None => "Model".to_string(),
        Some(c) if c.is_ascii_digit() => format!("Model{}", name),
        Some(_) => name,
    }
}

fn field_name(property: &str) -> String {
    let name = python_identifier(property);
    if PYTHON_KEYWORDS.contains(&name.as_str()) {
        format!("{}_", name)
    } else if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("field_{}", name)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::templates::NoopFormatter;
    use crate::validation::FunctionValidator;

    fn pets_spec() -> OpenApiContext {
        OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "info": {"title": "Pet Store", "version": "1.0.0"},
            "servers": [{"url": "https://petstore.example.com/v1"}],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "summary": "List pets",
                        "parameters": [
                            {"name": "limit", "in": "query", "required": false, "schema": {"type": "integer"}},
                            {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                        ]
                    },
                    "post": {
                        "operationId": "createPet",
                        "requestBody": {"content": {"application/json": {
                            "schema": {"$ref": "#/components/schemas/Pet"}
                        }}}
                    }
                },
                "/pets/{id}": {
                    "get": {
                        "operationId": "getPet",
                        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}]
                    }
                }
            },
            "components": {"schemas": {"Pet": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "description": "Pet name"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "class": {"type": "string"}
                }
            }}}
        }))
    }

    fn renderer() -> crate::Result<TemplateRenderer> {
        Ok(TemplateRenderer::new()?.with_formatter(Arc::new(NoopFormatter)))
    }

    #[test]
    fn test_project_names() {
        let names = ProjectNames::new(&pets_spec(), &CodegenConfig::default());
        assert_eq!(names.package, "mcp_pet_store");
        assert_eq!(names.agent_package, "agent_pet_store");
        assert_eq!(names.env_prefix, "PET_STORE");

        let config = CodegenConfig {
            title: Some("3scale API".to_string()),
            ..CodegenConfig::default()
        };
        assert_eq!(ProjectNames::new(&pets_spec(), &config).name, "api_3scale_api");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(field_name("class"), "class_");
        assert_eq!(field_name("x-rate"), "x_rate");
        assert_eq!(field_name("2fa"), "field_2fa");
        assert_eq!(class_name("pet_owner"), "PetOwner");
    }

    #[tokio::test]
    async fn test_emits_project_tree() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = pets_spec();
        let config = CodegenConfig::default();
        let renderer = renderer()?;

        let report = ProjectEmitter::new(&spec, &config, &renderer).emit(dir.path()).await?;
        let pkg = dir.path().join("mcp_pet_store");
        for file in [
            "api/client.py",
            "api/__init__.py",
            "models/base.py",
            "models/pet.py",
            "models/__init__.py",
            "tools/pets.py",
            "tools/pets_id.py",
            "tools/__init__.py",
            "server.py",
            "__init__.py",
        ] {
            assert!(pkg.join(file).exists(), "missing {}", file);
        }
        for file in ["pyproject.toml", ".env.example", "README.md"] {
            assert!(dir.path().join(file).exists(), "missing {}", file);
        }
        assert!(report.failed.is_empty());
        assert_eq!(report.tool_count(), 3);
        assert_eq!(
            report.registrations[0],
            ModuleRegistration {
                module: "pets".to_string(),
                functions: vec!["list_pets".to_string(), "create_pet".to_string()],
            }
        );

        let tools = tokio::fs::read_to_string(pkg.join("tools/pets.py")).await?;
        assert!(tools.contains("async def list_pets(param_limit: int = None, param_verbose: bool = False)"));
        assert!(tools.contains(
            "async def create_pet(body_name: str, body_tags: List[str] = None, body_class: str = None)"
        ));
        assert!(tools.contains("params[\"verbose\"] = str(param_verbose).lower()"));
        assert!(tools.contains("    if param_verbose:\n"));
        assert!(!tools.contains("if param_verbose is not None"));
        assert!(tools.contains("    if param_limit is not None:\n"));
        assert!(tools.contains("flat_body[\"tags\"] = body_tags"));
        assert!(tools.contains("from mcp_pet_store.api.client import"));

        let item = tokio::fs::read_to_string(pkg.join("tools/pets_id.py")).await?;
        assert!(item.contains("f\"/pets/{path_id}\""));

        let server = tokio::fs::read_to_string(pkg.join("server.py")).await?;
        assert!(server.contains("from mcp_pet_store.tools import pets_id"));
        assert!(server.contains("mcp.tool()(pets.list_pets)"));
        assert!(server.contains("mcp.tool()(pets_id.get_pet)"));

        let model = tokio::fs::read_to_string(pkg.join("models/pet.py")).await?;
        assert!(model.contains("class Pet(BaseModel):"));
        assert!(model.contains("    name: str\n"));
        assert!(model.contains("tags: Optional[List[str]] = None"));
        assert!(model.contains("class_: Optional[str] = Field(default=None, alias=\"class\")"));
        assert!(model.contains("class PetListResponse(APIResponse):"));

        let client = tokio::fs::read_to_string(pkg.join("api/client.py")).await?;
        assert!(client.contains("os.getenv(\"PET_STORE_API_URL\", \"https://petstore.example.com/v1\")"));
        Ok(())
    }

    #[tokio::test]
    async fn test_emitted_project_passes_function_validation() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = pets_spec();
        let config = CodegenConfig::default();
        let renderer = renderer()?;
        let report = ProjectEmitter::new(&spec, &config, &renderer).emit(dir.path()).await?;

        let result = FunctionValidator::new().validate_project(&report.package_dir).await?;
        assert!(result.passed(), "{:?}", result.errors);
        assert_eq!(result.functions.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = pets_spec();
        let config = CodegenConfig::default();
        let renderer = renderer()?.with_dry_run(true);

        let report = ProjectEmitter::new(&spec, &config, &renderer).emit(dir.path()).await?;
        assert!(!report.files.is_empty());
        assert!(!dir.path().join("mcp_pet_store").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_agent_variant_uses_fallback_prompt() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = pets_spec();
        let config = CodegenConfig {
            generate_agent: true,
            ..CodegenConfig::default()
        };
        let renderer = renderer()?;
        ProjectEmitter::new(&spec, &config, &renderer).emit(dir.path()).await?;

        assert!(!dir.path().join(".env.example").exists());
        assert!(!dir.path().join("README.md").exists());
        let prompts = tokio::fs::read_to_string(dir.path().join("agent_pet_store/prompts.py")).await?;
        assert!(prompts.contains("- list_pets: List pets"));
        assert!(prompts.contains("\"get_pet\","));
        assert!(dir.path().join("agent_pet_store/__init__.py").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_docstring_enhancement_fills_empty_descriptions() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = pets_spec();
        let mut config = CodegenConfig::default();
        config.overlay_enhancements.enhance_docstrings = true;
        let renderer = renderer()?;
        let llm = Arc::new(ScriptedLlm::new(|_msgs: &[crate::llm::ChatMessage]| {
            Ok("Enhanced   summary text.".to_string())
        }));

        let report = ProjectEmitter::new(&spec, &config, &renderer)
            .with_llm(llm.clone(), Some(PromptRegistry::builtin()?))
            .emit(dir.path())
            .await?;

        assert_eq!(report.llm_calls, 3);
        assert_eq!(report.input_tokens, 30);
        let tools = tokio::fs::read_to_string(dir.path().join("mcp_pet_store/tools/pets.py")).await?;
        assert!(tools.contains("Enhanced summary text."));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_operation_ids_are_emitted() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = OpenApiContext::from_value(json!({
            "openapi": "3.0.0",
            "info": {"title": "Dup", "version": "1"},
            "paths": {
                "/a": {"get": {"operationId": "getThing"}},
                "/b": {"get": {"operationId": "get_thing"}}
            }
        }));
        let config = CodegenConfig::default();
        let renderer = renderer()?;
        let report = ProjectEmitter::new(&spec, &config, &renderer).emit(dir.path()).await?;
        assert_eq!(report.tool_count(), 2);

        let result = FunctionValidator::new().validate_project(&report.package_dir).await?;
        assert!(!result.passed());
        assert_eq!(result.duplicates.get("get_thing").map(Vec::len), Some(2));
        Ok(())
    }
}
