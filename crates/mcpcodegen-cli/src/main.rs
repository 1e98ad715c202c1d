//! mcpcodegen CLI entrypoint
//! Parses command-line arguments and dispatches to the core pipeline.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

// External imports (alphabetized)
use anyhow::Context;
use clap::{Parser, ValueEnum};
use mcpcodegen_core::{
    pipeline, CodegenConfig, EnhanceOptions, FunctionValidator, OutputFormat, Pipeline, Thresholds,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcpcodegen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity; `RUST_LOG` takes precedence when set
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Enhance a spec with an overlay, normalize it and generate the MCP project
    Enhance {
        /// Path or URL to the OpenAPI spec (YAML or JSON)
        spec: String,
        /// Directory receiving the generated project
        output_dir: PathBuf,
        /// Configuration file (default: config.yaml next to the spec)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Prompt registry file (default: user config dir, then built-in prompts)
        #[arg(long)]
        prompts: Option<PathBuf>,
        /// Keep the generated overlay at this path
        #[arg(long)]
        save_overlay: Option<PathBuf>,
        /// Keep the enhanced spec at this path
        #[arg(long)]
        save_enhanced_spec: Option<PathBuf>,
        /// Generate from the spec without an overlay
        #[arg(long, conflicts_with = "overlay_only")]
        skip_overlay: bool,
        /// Stop after writing the enhanced spec
        #[arg(long)]
        overlay_only: bool,
        /// Format of the saved overlay
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
        /// Use rule-based descriptions only
        #[arg(long)]
        no_llm: bool,
        /// Log the files that would be written without writing them
        #[arg(long)]
        dry_run: bool,
        /// Reference processing time for the performance check
        #[arg(long)]
        baseline_seconds: Option<f64>,
        /// Only print failed checks
        #[arg(long)]
        violations_only: bool,
    },
    /// Generate an overlay without applying it
    GenerateOverlay {
        /// Path or URL to the OpenAPI spec (YAML or JSON)
        spec: String,
        /// Output overlay file
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        prompts: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
        #[arg(long)]
        no_llm: bool,
    },
    /// Apply an overlay to a spec
    ApplyOverlay {
        /// Path or URL to the OpenAPI spec (YAML or JSON)
        spec: String,
        /// Overlay file (YAML or JSON)
        overlay: PathBuf,
        /// Output spec file
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Score an enhanced spec against its original
    Validate {
        original: String,
        enhanced: String,
        /// Only print failed checks
        #[arg(long)]
        violations_only: bool,
        /// Reference processing time for the performance check
        #[arg(long)]
        baseline_seconds: Option<f64>,
    },
    /// Generate the MCP project from an already enhanced spec
    Generate {
        /// Path or URL to the OpenAPI spec (YAML or JSON)
        spec: String,
        /// Directory receiving the generated project
        output_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        prompts: Option<PathBuf>,
        #[arg(long)]
        no_llm: bool,
        /// Log the files that would be written without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Check tool function names of generated projects
    ValidateFunctions {
        /// Project directories, or directories containing `mcp_*` projects
        #[arg(required = true)]
        project_dirs: Vec<PathBuf>,
        /// Names longer than this produce a warning
        #[arg(long)]
        max_length: Option<usize>,
    },
}

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit config, `config.yaml` beside a local spec, or defaults
async fn load_config(
    explicit: Option<&Path>,
    spec: &str,
    no_llm: bool,
) -> anyhow::Result<CodegenConfig> {
    let mut config = CodegenConfig::discover(explicit, Path::new(spec))
        .await
        .context("Failed to load configuration")?;
    if no_llm {
        config.overlay_enhancements.use_llm = false;
    }
    Ok(config)
}

async fn build_pipeline(
    config: CodegenConfig,
    prompts: Option<&Path>,
    dry_run: bool,
) -> Pipeline {
    Pipeline::new(config)
        .with_dry_run(dry_run)
        .with_env_llm(prompts)
        .await
}

fn exit_code(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        tracing::warn!("One or more checks failed");
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {}", e);
        }
    }
    init_logging(cli.log_level);

    match cli.command {
        Commands::Enhance {
            spec,
            output_dir,
            config,
            prompts,
            save_overlay,
            save_enhanced_spec,
            skip_overlay,
            overlay_only,
            format,
            no_llm,
            dry_run,
            baseline_seconds,
            violations_only,
        } => {
            let config = load_config(config.as_deref(), &spec, no_llm).await?;
            let pipeline = build_pipeline(config, prompts.as_deref(), dry_run).await;
            let options = EnhanceOptions {
                save_overlay,
                save_enhanced_spec,
                skip_overlay,
                overlay_only,
                format,
                baseline: baseline_seconds.map(Duration::from_secs_f64),
            };

            let outcome = pipeline
                .enhance(&spec, &output_dir, &options)
                .await
                .with_context(|| format!("Failed to enhance {}", spec))?;

            println!("{}", outcome.summary());
            println!();
            println!("{}", outcome.report.render(Some(&outcome.metrics), violations_only));
            if overlay_only {
                if let Some(path) = &outcome.enhanced_path {
                    println!(
                        "Generate the project with: mcpcodegen generate {} {}",
                        path.display(),
                        output_dir.display()
                    );
                }
            }
            Ok(exit_code(outcome.passed()))
        }
        Commands::GenerateOverlay {
            spec,
            output,
            config,
            prompts,
            format,
            no_llm,
        } => {
            let config = load_config(config.as_deref(), &spec, no_llm).await?;
            let pipeline = build_pipeline(config, prompts.as_deref(), false).await;
            let stats = pipeline
                .generate_overlay(&spec, &output, format)
                .await
                .with_context(|| format!("Failed to generate overlay for {}", spec))?;
            println!(
                "Generated overlay with {} actions for {} operations: {}",
                stats.actions,
                stats.operations,
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::ApplyOverlay {
            spec,
            overlay,
            output,
            format,
        } => {
            let stats = pipeline::apply_overlay(&spec, &overlay, &output, format)
                .await
                .with_context(|| format!("Failed to apply {} to {}", overlay.display(), spec))?;
            println!(
                "Applied {} actions ({} created, {} skipped): {}",
                stats.applied,
                stats.created,
                stats.skipped,
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate {
            original,
            enhanced,
            violations_only,
            baseline_seconds,
        } => {
            let (report, metrics) = pipeline::validate(
                &original,
                &enhanced,
                Thresholds::default(),
                baseline_seconds.map(Duration::from_secs_f64),
            )
            .await
            .context("Failed to load specs for validation")?;
            println!("{}", report.render(Some(&metrics), violations_only));
            Ok(exit_code(report.passed()))
        }
        Commands::Generate {
            spec,
            output_dir,
            config,
            prompts,
            no_llm,
            dry_run,
        } => {
            let config = load_config(config.as_deref(), &spec, no_llm).await?;
            let pipeline = build_pipeline(config, prompts.as_deref(), dry_run).await;
            let report = pipeline
                .generate(&spec, &output_dir)
                .await
                .with_context(|| format!("Failed to generate project from {}", spec))?;

            println!(
                "Generated {} ({} files, {} tools)",
                report.package_dir.display(),
                report.files.len(),
                report.tool_count()
            );
            for (path, reason) in &report.failed {
                println!("Failed: {} ({})", path.display(), reason);
            }
            Ok(exit_code(report.failed.is_empty()))
        }
        Commands::ValidateFunctions {
            project_dirs,
            max_length,
        } => {
            let mut validator = FunctionValidator::new();
            if let Some(target) = max_length {
                validator = validator.with_target_length(target);
            }
            let report = validator
                .validate_all(&project_dirs)
                .await
                .context("Function validation failed")?;
            println!("{}", report.render());
            Ok(exit_code(report.passed()))
        }
    }
}
