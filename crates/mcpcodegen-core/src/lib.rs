//! mcpcodegen core library
//!
//! Enhances OpenAPI specifications with agent-oriented descriptions through
//! OpenAPI Overlays, normalizes them, and generates Python MCP tool servers
//! from the result.

pub mod config;
pub mod emitter;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod llm;
pub mod normalize;
pub mod openapi;
pub mod overlay;
pub mod pipeline;
pub mod prompts;
pub mod templates;
pub mod types;
pub mod utils;
pub mod validation;

pub use crate::{
    config::CodegenConfig,
    emitter::{EmitReport, ProjectEmitter},
    error::{Error, Result},
    llm::{LlmBridge, OpenAiCompatibleClient},
    openapi::OpenApiContext,
    overlay::{OutputFormat, OverlayApplier, OverlayDocument, OverlayGenerator},
    pipeline::{apply_overlay, validate, EnhanceOptions, Pipeline, PipelineOutcome},
    prompts::PromptRegistry,
    templates::{Formatter, NoopFormatter, RuffFormatter, TemplateRenderer},
    validation::{ComplianceValidator, FunctionReport, FunctionValidator, Thresholds, ValidationReport},
};
