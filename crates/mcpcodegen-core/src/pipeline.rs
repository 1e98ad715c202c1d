//! End-to-end driver: overlay generation, overlay application,
//! normalization, project emission and compliance validation.
//!
//! The spec tree is owned here. The overlay generator and the emitter only
//! borrow it; the applier and the normalizer mutate it between those stages.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::CodegenConfig,
    emitter::{EmitReport, ProjectEmitter},
    gateway::write_gateway_config,
    llm::{LlmBridge, OpenAiCompatibleClient},
    normalize::{normalize, NormalizationStats},
    openapi::OpenApiContext,
    overlay::{
        generator::DEFAULT_CONCURRENCY, ApplyStats, GenerationStats, OutputFormat, OverlayApplier,
        OverlayDocument, OverlayGenerator,
    },
    prompts::PromptRegistry,
    templates::{Formatter, RuffFormatter, TemplateRenderer},
    validation::{ComplianceValidator, Metrics, Thresholds, ValidationReport},
};

/// Enhanced spec file name used when the spec has to be kept but no path was given
pub const ENHANCED_SPEC_FILE: &str = "enhanced_openapi.json";

/// Switches for [`Pipeline::enhance`]
#[derive(Debug, Clone, Default)]
pub struct EnhanceOptions {
    /// Keep the generated overlay at this path
    pub save_overlay: Option<PathBuf>,
    /// Keep the enhanced spec at this path
    pub save_enhanced_spec: Option<PathBuf>,
    /// Normalize and emit the input spec as-is
    pub skip_overlay: bool,
    /// Stop after writing the enhanced spec
    pub overlay_only: bool,
    /// Format of the saved overlay
    pub format: OutputFormat,
    /// Reference run time for the performance check
    pub baseline: Option<Duration>,
}

/// Everything an `enhance` run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: ValidationReport,
    pub metrics: Metrics,
    pub normalization: NormalizationStats,
    pub emit: Option<EmitReport>,
    pub overlay_path: Option<PathBuf>,
    pub enhanced_path: Option<PathBuf>,
    pub gateway_path: Option<PathBuf>,
}

impl PipelineOutcome {
    /// Short listing of the artifacts, printed ahead of the compliance report
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(path) = &self.overlay_path {
            lines.push(format!("Overlay: {}", path.display()));
        }
        if let Some(path) = &self.enhanced_path {
            lines.push(format!("Enhanced spec: {}", path.display()));
        }
        if let Some(path) = &self.gateway_path {
            lines.push(format!("Agentgateway config: {}", path.display()));
        }
        if self.normalization.converted_swagger {
            lines.push("Converted Swagger 2.0 document to OpenAPI 3.0".to_string());
        }
        if let Some(emit) = &self.emit {
            lines.push(format!(
                "Project: {} ({} files, {} tools)",
                emit.package_dir.display(),
                emit.files.len(),
                emit.tool_count()
            ));
            for (path, reason) in &emit.failed {
                lines.push(format!("Failed: {} ({})", path.display(), reason));
            }
        }
        lines.join("\n")
    }

    /// Validation passed and every emitted file could be formatted
    pub fn passed(&self) -> bool {
        self.report.passed() && self.emit.as_ref().map_or(true, |e| e.failed.is_empty())
    }
}

/// Drives the stages with one configuration, LLM and formatter
pub struct Pipeline {
    config: CodegenConfig,
    llm: Option<Arc<dyn LlmBridge>>,
    prompts: Option<PromptRegistry>,
    formatter: Arc<dyn Formatter>,
    thresholds: Thresholds,
    concurrency: usize,
    dry_run: bool,
}

impl Pipeline {
    /// Rule-based pipeline formatting Python output with `ruff`
    pub fn new(config: CodegenConfig) -> Self {
        Self {
            config,
            llm: None,
            prompts: None,
            formatter: Arc::new(RuffFormatter::default()),
            thresholds: Thresholds::default(),
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmBridge>, prompts: Option<PromptRegistry>) -> Self {
        self.llm = Some(llm);
        self.prompts = prompts;
        self
    }

    /// Attach the OpenAI-compatible client configured in the environment.
    ///
    /// Leaves the pipeline rule-based when the configuration disables the
    /// LLM or no API key is set.
    pub async fn with_env_llm(self, prompts_path: Option<&Path>) -> Self {
        if !self.config.overlay_enhancements.use_llm {
            log::info!("LLM enhancement disabled by configuration");
            return self;
        }
        match OpenAiCompatibleClient::from_env() {
            Some(client) => {
                log::info!("Using LLM model {}", client.name());
                let prompts = PromptRegistry::locate(prompts_path).await;
                self.with_llm(Arc::new(client), prompts)
            }
            None => {
                log::info!("OPENAI_API_KEY not set, using rule-based descriptions");
                self
            }
        }
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Render nothing to disk; emission only logs what it would write
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &CodegenConfig {
        &self.config
    }

    fn overlay_generator(&self) -> OverlayGenerator {
        let generator = OverlayGenerator::new(self.config.overlay_enhancements.clone())
            .with_concurrency(self.concurrency);
        match &self.llm {
            Some(llm) => generator.with_llm(Arc::clone(llm), self.prompts.clone()),
            None => generator,
        }
    }

    fn renderer(&self) -> crate::Result<TemplateRenderer> {
        Ok(TemplateRenderer::new()?
            .with_formatter(Arc::clone(&self.formatter))
            .with_dry_run(self.dry_run))
    }

    /// Build the overlay for a loaded spec
    pub async fn build_overlay(&self, spec: &OpenApiContext) -> (OverlayDocument, GenerationStats) {
        let (overlay, stats) = self.overlay_generator().generate(spec).await;
        log::info!(
            "Generated {} overlay actions for {} operations ({} LLM calls, {} failures)",
            stats.actions,
            stats.operations,
            stats.llm_calls,
            stats.llm_failures
        );
        if stats.estimated_calls > 0 {
            log::debug!("{} LLM calls reported no token usage", stats.estimated_calls);
        }
        (overlay, stats)
    }

    /// Load `spec`, build its overlay and save it to `output`
    pub async fn generate_overlay(
        &self,
        spec: &str,
        output: &Path,
        format: OutputFormat,
    ) -> crate::Result<GenerationStats> {
        let context = OpenApiContext::from_file_or_url(spec).await?;
        let (overlay, stats) = self.build_overlay(&context).await;
        overlay.save(output, format).await?;
        log::info!("Saved overlay to {}", output.display());
        Ok(stats)
    }

    /// Emit the project for `spec` into `output_dir`.
    ///
    /// The spec is normalized first; a spec that is already normalized
    /// passes through unchanged.
    pub async fn generate(&self, spec: &str, output_dir: &Path) -> crate::Result<EmitReport> {
        let mut context = OpenApiContext::from_file_or_url(spec).await?;
        let stats = normalize(&mut context.json);
        if stats.total_fixes() > 0 {
            log::info!("Normalization applied {} fixes", stats.total_fixes());
        }
        self.emit(&context, output_dir).await
    }

    async fn emit(&self, spec: &OpenApiContext, output_dir: &Path) -> crate::Result<EmitReport> {
        let renderer = self.renderer()?;
        let emitter =
            ProjectEmitter::new(spec, &self.config, &renderer).with_concurrency(self.concurrency);
        let emitter = match &self.llm {
            Some(llm) => emitter.with_llm(Arc::clone(llm), self.prompts.clone()),
            None => emitter,
        };
        emitter.emit(output_dir).await
    }

    /// Run every stage over `spec` and validate the result
    pub async fn enhance(
        &self,
        spec: &str,
        output_dir: &Path,
        options: &EnhanceOptions,
    ) -> crate::Result<PipelineOutcome> {
        let mut metrics = Metrics::new();
        metrics.start();

        let mut context = OpenApiContext::from_file_or_url(spec).await?;
        let original = context.clone();
        metrics.original_size = original.to_json_string()?.len() as u64;

        let mut overlay_path = None;
        if options.skip_overlay {
            log::info!("Skipping overlay generation");
        } else {
            log::info!("Generating OpenAPI overlay");
            let (overlay, stats) = self.build_overlay(&context).await;
            metrics.record_generation(&stats);

            if let Some(path) = &options.save_overlay {
                if self.dry_run {
                    log::info!("[dry-run] Would save overlay to {}", path.display());
                } else {
                    overlay.save(path, options.format).await?;
                    log::info!("Saved overlay to {}", path.display());
                    overlay_path = Some(path.clone());
                }
            }

            log::info!("Applying overlay");
            let applied = OverlayApplier::new().apply(&mut context.json, &overlay);
            metrics.record_apply(&applied);
        }

        let normalization = normalize(&mut context.json);
        metrics.record_normalization(&normalization);
        metrics.operations_processed = metrics.operations_processed.max(context.operations().len());

        let enhanced_json = context.to_json_string()?;
        metrics.enhanced_size = enhanced_json.len() as u64;

        // The gateway config points at the spec file, so it has to be kept
        let keep_spec = options.overlay_only || self.config.agentgateway.is_some();
        let enhanced_target = options
            .save_enhanced_spec
            .clone()
            .or_else(|| keep_spec.then(|| output_dir.join(ENHANCED_SPEC_FILE)));
        let mut enhanced_path = None;
        if let Some(path) = enhanced_target {
            if self.dry_run {
                log::info!("[dry-run] Would save enhanced spec to {}", path.display());
            } else {
                context.write_json(&path).await?;
                log::info!("Saved enhanced spec to {}", path.display());
                enhanced_path = Some(path);
            }
        }

        let emit = if options.overlay_only {
            None
        } else {
            log::info!("Generating MCP server code");
            let report = self.emit(&context, output_dir).await?;
            metrics.llm_calls += report.llm_calls;
            metrics.add_generation_tokens(report.input_tokens, report.output_tokens);
            Some(report)
        };

        let mut gateway_path = None;
        if let (Some(gateway), Some(path)) = (&self.config.agentgateway, &enhanced_path) {
            gateway_path = Some(write_gateway_config(gateway, path).await?);
        }

        metrics.finish();
        let report = ComplianceValidator::new(self.thresholds).run(
            &original,
            &context,
            metrics.processing_time(),
            options.baseline,
        );

        Ok(PipelineOutcome {
            report,
            metrics,
            normalization,
            emit,
            overlay_path,
            enhanced_path,
            gateway_path,
        })
    }
}

/// Apply the overlay at `overlay` to `spec` and write the result to `output`
pub async fn apply_overlay(
    spec: &str,
    overlay: &Path,
    output: &Path,
    format: OutputFormat,
) -> crate::Result<ApplyStats> {
    let mut context = OpenApiContext::from_file_or_url(spec).await?;
    let document = OverlayDocument::from_file(overlay).await?;
    let stats = OverlayApplier::new().apply(&mut context.json, &document);
    log::info!(
        "Applied {} actions ({} created paths, {} skipped)",
        stats.applied,
        stats.created,
        stats.skipped
    );
    write_spec(&context, output, format).await?;
    Ok(stats)
}

/// Score an enhanced spec against its original
pub async fn validate(
    original: &str,
    enhanced: &str,
    thresholds: Thresholds,
    baseline: Option<Duration>,
) -> crate::Result<(ValidationReport, Metrics)> {
    let mut metrics = Metrics::new();
    metrics.start();
    let original = OpenApiContext::from_file_or_url(original).await?;
    let enhanced = OpenApiContext::from_file_or_url(enhanced).await?;
    metrics.original_size = original.to_json_string()?.len() as u64;
    metrics.enhanced_size = enhanced.to_json_string()?.len() as u64;
    metrics.operations_processed = enhanced.operations().len();
    metrics.finish();

    let report = ComplianceValidator::new(thresholds).run(
        &original,
        &enhanced,
        metrics.processing_time(),
        baseline,
    );
    Ok((report, metrics))
}

/// Write `spec` as JSON or YAML, creating parent directories
pub async fn write_spec(spec: &OpenApiContext, path: &Path, format: OutputFormat) -> crate::Result<()> {
    match format {
        OutputFormat::Json => spec.write_json(path).await,
        OutputFormat::Yaml => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_yaml::to_string(&spec.json)?).await?;
            Ok(())
        }
    }
}
