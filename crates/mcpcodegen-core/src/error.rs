//! Library error type.
//!
//! Every fallible operation returns [`Result`]. Failures the pipeline can
//! recover from (LLM calls, prompt loading, formatting) are caught where they
//! happen and never surface here.
//!
//! ```
//! use mcpcodegen_core::error::{Error, Result};
//!
//! fn load_overlay() -> Result<()> {
//!     Err(Error::overlay("action has no target"))
//! }
//! assert!(load_overlay().unwrap_err().to_string().starts_with("Invalid overlay"));
//! ```

use std::path::Path;

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by loading, generation and emission
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML document that does not parse
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document that does not parse
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Spec could not be loaded or is not an OpenAPI/Swagger document
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// Overlay document or action that cannot be used
    #[error("Invalid overlay: {0}")]
    Overlay(String),

    /// Rendering or formatting of an emitted file failed
    #[error("Template error: {0}")]
    Template(String),

    /// Tera failed to parse or render a template
    #[error("Template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// LLM request failed or returned no usable text
    #[error("LLM error: {0}")]
    Llm(String),

    /// Transport error while fetching a spec or calling the LLM
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration file missing, unreadable or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an OpenAPI loading error
    pub fn openapi<S: Into<String>>(msg: S) -> Self {
        Self::OpenApi(msg.into())
    }

    /// Create an overlay error
    pub fn overlay<S: Into<String>>(msg: S) -> Self {
        Self::Overlay(msg.into())
    }

    /// Create a template error
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }

    /// Create an LLM error
    pub fn llm<S: Into<String>>(msg: S) -> Self {
        Self::Llm(msg.into())
    }

    /// Template error naming the file whose emission failed
    pub fn emission(path: &Path, cause: Self) -> Self {
        Self::Template(format!("{}: {}", path.display(), cause))
    }
}
