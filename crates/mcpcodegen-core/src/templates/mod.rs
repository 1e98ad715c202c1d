//! Template system for emitting the Python project.
//!
//! Templates are embedded at compile time and rendered with Tera. Every
//! written file is handed to a [`Formatter`]; in dry-run mode nothing
//! touches the disk.

pub mod formatter;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tera::{Context, Tera};

use crate::utils::write_atomic;

pub use formatter::{Formatter, NoopFormatter, RuffFormatter};

macro_rules! embed {
    ($($name:literal),* $(,)?) => {
        &[$(($name, include_str!(concat!("../../templates/python/", $name)))),*]
    };
}

/// Embedded Python project templates, keyed by template name
pub const TEMPLATES: &[(&str, &str)] = embed![
    "client.py.tera",
    "tool.py.tera",
    "server.py.tera",
    "models_base.py.tera",
    "model.py.tera",
    "init.py.tera",
    "pyproject.toml.tera",
    "env.example.tera",
    "README.md.tera",
    "agent_init.py.tera",
    "agent_prompts.py.tera",
];

/// Outcome of rendering one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Written, and formatted when the formatter supports the file
    Written,
    /// Dry run; nothing was written
    DryRun,
    /// Written, but the formatter rejected it
    FormatFailed(String),
}

/// Renders templates to files
pub struct TemplateRenderer {
    tera: Tera,
    formatter: Arc<dyn Formatter>,
    dry_run: bool,
}

impl TemplateRenderer {
    /// Renderer over the embedded templates, formatting with `ruff`
    pub fn new() -> crate::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        tera.register_filter("py_string", py_string);
        tera.register_filter("docstring", docstring);
        Ok(Self {
            tera,
            formatter: Arc::new(RuffFormatter::default()),
            dry_run: false,
        })
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template(name).is_ok()
    }

    pub fn render_to_string<T: Serialize>(&self, template: &str, context: &T) -> crate::Result<String> {
        let context = Context::from_serialize(context)?;
        self.tera.render(template, &context).map_err(|e| {
            log::error!("Template rendering failed for '{}': {}", template, e);
            crate::Error::template(format!(
                "Failed to render template '{}': {}",
                template,
                error_chain(&e)
            ))
        })
    }

    /// Render `template` into `output`, creating parent directories, then
    /// run the formatter over the result.
    pub async fn render<T: Serialize>(
        &self,
        template: &str,
        output: &Path,
        context: &T,
    ) -> crate::Result<Rendered> {
        let content = self.render_to_string(template, context)?;

        if self.dry_run {
            log::info!(
                "[dry-run] Would write {} ({} bytes) from {}",
                output.display(),
                content.len(),
                template
            );
            return Ok(Rendered::DryRun);
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(output, &content).await?;
        log::debug!("Wrote {} from {}", output.display(), template);

        if !self.formatter.supports(output) {
            return Ok(Rendered::Written);
        }
        match self.formatter.format(output).await {
            Ok(()) => Ok(Rendered::Written),
            Err(e) => {
                log::warn!("{} could not format {}: {}", self.formatter.name(), output.display(), e);
                Ok(Rendered::FormatFailed(e.to_string()))
            }
        }
    }
}

fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Double-quoted Python string literal
fn py_string(value: &JsonValue, _: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
    let text = match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(JsonValue::String(serde_json::to_string(&text)?))
}

/// Text that is safe inside a `"""` docstring
fn docstring(value: &JsonValue, _: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
    let text = value.as_str().unwrap_or_default();
    Ok(JsonValue::String(
        text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\""),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_templates_parse() -> crate::Result<()> {
        let renderer = TemplateRenderer::new()?;
        for (name, _) in TEMPLATES {
            assert!(renderer.has_template(name), "missing {}", name);
        }
        Ok(())
    }

    #[test]
    fn test_filters() -> crate::Result<()> {
        let args = HashMap::new();
        assert_eq!(
            py_string(&json!("say \"hi\""), &args)?,
            json!("\"say \\\"hi\\\"\"")
        );
        assert_eq!(docstring(&json!("a \"\"\" b"), &args)?, json!("a \\\"\\\"\\\" b"));
        Ok(())
    }

    #[tokio::test]
    async fn test_render_creates_parents() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let renderer = TemplateRenderer::new()?.with_formatter(Arc::new(NoopFormatter));
        let output = dir.path().join("pkg").join("tools").join("__init__.py");

        let rendered = renderer
            .render("init.py.tera", &output, &json!({"doc": "Tool modules.", "exports": ["pets"]}))
            .await?;
        assert_eq!(rendered, Rendered::Written);
        let content = tokio::fs::read_to_string(&output).await?;
        assert!(content.contains("\"\"\"Tool modules.\"\"\""));
        assert!(content.contains("\"pets\""));
        Ok(())
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let renderer = TemplateRenderer::new()?
            .with_formatter(Arc::new(NoopFormatter))
            .with_dry_run(true);
        let output = dir.path().join("nested").join("__init__.py");

        let rendered = renderer
            .render("init.py.tera", &output, &json!({"doc": "Package.", "exports": []}))
            .await?;
        assert_eq!(rendered, Rendered::DryRun);
        assert!(!dir.path().join("nested").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_variable_is_an_error() -> crate::Result<()> {
        let renderer = TemplateRenderer::new()?;
        let err = renderer.render_to_string("init.py.tera", &json!({})).unwrap_err();
        assert!(err.to_string().contains("init.py.tera"));
        Ok(())
    }

    #[tokio::test]
    async fn test_render_failure_leaves_previous_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let renderer = TemplateRenderer::new()?.with_formatter(Arc::new(NoopFormatter));
        let output = dir.path().join("__init__.py");
        tokio::fs::write(&output, "\"\"\"Previous.\"\"\"\n").await?;

        assert!(renderer.render("init.py.tera", &output, &json!({})).await.is_err());
        assert_eq!(tokio::fs::read_to_string(&output).await?, "\"\"\"Previous.\"\"\"\n");

        let fresh = dir.path().join("fresh.py");
        assert!(renderer.render("init.py.tera", &fresh, &json!({})).await.is_err());
        let mut entries = tokio::fs::read_dir(dir.path()).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["__init__.py"]);
        Ok(())
    }

    struct RejectingFormatter;

    #[async_trait::async_trait]
    impl Formatter for RejectingFormatter {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn supports(&self, path: &Path) -> bool {
            path.extension().map_or(false, |e| e == "py")
        }

        async fn format(&self, _path: &Path) -> crate::Result<()> {
            Err(crate::Error::template("syntax error"))
        }
    }

    #[tokio::test]
    async fn test_format_failure_is_reported() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let renderer = TemplateRenderer::new()?.with_formatter(Arc::new(RejectingFormatter));
        let ctx = json!({"doc": "Package.", "exports": []});

        let py = renderer.render("init.py.tera", &dir.path().join("a.py"), &ctx).await?;
        assert!(matches!(py, Rendered::FormatFailed(_)));
        let md = renderer.render("init.py.tera", &dir.path().join("a.md"), &ctx).await?;
        assert_eq!(md, Rendered::Written);
        Ok(())
    }
}
