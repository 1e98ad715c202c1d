//! Configuration management for mcpcodegen.
//!
//! This module defines the `CodegenConfig` struct that drives overlay
//! enhancement and project emission. The configuration is loaded from a YAML
//! file (conventionally `config.yaml` next to the OpenAPI spec) or created
//! programmatically; every key has a default so partial files are accepted.
//!
//! # Examples
//!
//! ```no_run
//! use mcpcodegen_core::config::CodegenConfig;
//!
//! # async fn example() -> mcpcodegen_core::Result<()> {
//! let mut config = CodegenConfig::from_file("config.yaml").await?;
//! config.overlay_enhancements.use_llm = false;
//! config.save("config.out.yaml").await?;
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use tokio::fs;

/// File name looked up next to the spec when no explicit config is given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Configuration for enhancement and MCP project generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Project title; falls back to the spec's `info.title`
    #[serde(default)]
    pub title: Option<String>,

    /// Project description written into package metadata
    #[serde(default)]
    pub description: Option<String>,

    /// Version of the generated package
    #[serde(default = "default_version")]
    pub version: String,

    /// Package author
    #[serde(default = "default_author")]
    pub author: String,

    /// Author e-mail
    #[serde(default)]
    pub email: Option<String>,

    /// License identifier of the generated package
    #[serde(default = "default_license")]
    pub license: String,

    /// Python version constraint of the generated package
    #[serde(default = "default_python_version")]
    pub python_version: String,

    /// Whether the agent package is emitted alongside the MCP server
    #[serde(default)]
    pub generate_agent: bool,

    /// Whether the evaluation harness is requested
    #[serde(default)]
    pub generate_eval: bool,

    /// Whether the SLIM transport is enabled for the agent
    #[serde(default)]
    pub enable_slim: bool,

    /// Whether the agent is fronted by an A2A proxy
    #[serde(default)]
    pub with_a2a_proxy: bool,

    /// Overlay generation settings
    #[serde(default)]
    pub overlay_enhancements: OverlayEnhancements,

    /// Optional agentgateway configuration
    #[serde(default)]
    pub agentgateway: Option<AgentGatewayConfig>,
}

/// Settings for the overlay generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEnhancements {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Use the LLM bridge when one is available
    #[serde(default = "default_true")]
    pub use_llm: bool,

    /// Upper bound for LLM-produced parameter descriptions
    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,

    #[serde(default = "default_true")]
    pub enhance_crud_operations: bool,

    #[serde(default = "default_true")]
    pub add_use_cases: bool,

    #[serde(default = "default_true")]
    pub enhance_parameters: bool,

    #[serde(default = "default_true")]
    pub add_parameter_guidance: bool,

    #[serde(default = "default_true")]
    pub agentic_focus: bool,

    /// Ask the LLM for docstrings of tool functions lacking a description
    #[serde(default)]
    pub enhance_docstrings: bool,
}

impl Default for OverlayEnhancements {
    fn default() -> Self {
        Self {
            enabled: true,
            use_llm: true,
            max_description_length: default_max_description_length(),
            enhance_crud_operations: true,
            add_use_cases: true,
            enhance_parameters: true,
            add_parameter_guidance: true,
            agentic_focus: true,
            enhance_docstrings: false,
        }
    }
}

/// agentgateway front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    #[serde(default)]
    pub backend: GatewayBackend,

    #[serde(default)]
    pub cors: GatewayCors,
}

impl Default for AgentGatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            backend: GatewayBackend::default(),
            cors: GatewayCors::default(),
        }
    }
}

/// Upstream API the gateway proxies to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBackend {
    #[serde(default = "default_backend_host")]
    pub host: String,

    #[serde(default = "default_backend_port")]
    pub port: u16,

    #[serde(default = "default_backend_path")]
    pub path: String,
}

impl Default for GatewayBackend {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            path: default_backend_path(),
        }
    }
}

/// CORS policy attached to the gateway route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCors {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_wildcard")]
    pub allow_origins: Vec<String>,

    #[serde(default = "default_allow_methods")]
    pub allow_methods: Vec<String>,

    #[serde(default = "default_wildcard")]
    pub allow_headers: Vec<String>,

    #[serde(default = "default_expose_headers")]
    pub expose_headers: Vec<String>,

    /// Either a number of seconds or a duration string such as `"1h"`
    #[serde(default)]
    pub max_age: MaxAge,
}

impl Default for GatewayCors {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: default_wildcard(),
            allow_methods: default_allow_methods(),
            allow_headers: default_wildcard(),
            expose_headers: default_expose_headers(),
            max_age: MaxAge::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxAge {
    Seconds(u64),
    Duration(String),
}

impl Default for MaxAge {
    fn default() -> Self {
        Self::Seconds(3600)
    }
}

impl MaxAge {
    /// Render as the duration string the gateway expects
    pub fn as_duration(&self) -> String {
        match self {
            Self::Seconds(secs) => format!("{}s", secs),
            Self::Duration(d) => d.clone(),
        }
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            version: default_version(),
            author: default_author(),
            email: None,
            license: default_license(),
            python_version: default_python_version(),
            generate_agent: false,
            generate_eval: false,
            enable_slim: false,
            with_a2a_proxy: false,
            overlay_enhancements: OverlayEnhancements::default(),
            agentgateway: None,
        }
    }
}

impl CodegenConfig {
    /// Load configuration from a file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path).await?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load an explicit config file, else `config.yaml` beside the spec, else defaults
    pub async fn discover(explicit: Option<&Path>, spec_path: &Path) -> crate::Result<Self> {
        if let Some(path) = explicit {
            log::info!("Using configuration file: {}", path.display());
            return Self::from_file(path).await;
        }

        let sibling = spec_path
            .parent()
            .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if fs::try_exists(&sibling).await.unwrap_or(false) {
            log::info!("Using configuration file: {}", sibling.display());
            Self::from_file(&sibling).await
        } else {
            log::debug!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_author() -> String {
    "mcpcodegen".to_string()
}

fn default_license() -> String {
    "Apache-2.0".to_string()
}

fn default_python_version() -> String {
    "3.13".to_string()
}

fn default_max_description_length() -> usize {
    300
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_backend_host() -> String {
    "localhost".to_string()
}

fn default_backend_port() -> u16 {
    8000
}

fn default_backend_path() -> String {
    "/".to_string()
}

fn default_wildcard() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allow_methods() -> Vec<String> {
    ["GET", "POST", "OPTIONS"].iter().map(|s| s.to_string()).collect()
}

fn default_expose_headers() -> Vec<String> {
    ["mcp-protocol-version", "Content-Type", "cache-control"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_roundtrip() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.yaml");

        let mut config = CodegenConfig::default();
        config.title = Some("Petstore".to_string());
        config.generate_agent = true;
        config.save(&file_path).await?;

        let loaded = CodegenConfig::from_file(&file_path).await?;
        assert_eq!(loaded.title.as_deref(), Some("Petstore"));
        assert!(loaded.generate_agent);
        assert_eq!(loaded.version, "0.1.0");
        assert_eq!(loaded.overlay_enhancements.max_description_length, 300);
        assert!(loaded.agentgateway.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.yaml");
        tokio::fs::write(
            &file_path,
            "overlay_enhancements:\n  use_llm: false\nagentgateway:\n  port: 4000\n  cors:\n    max_age: 1h\n",
        )
        .await?;

        let config = CodegenConfig::from_file(&file_path).await?;
        assert!(!config.overlay_enhancements.use_llm);
        assert!(config.overlay_enhancements.enhance_parameters);
        let gateway = config.agentgateway.expect("gateway section");
        assert_eq!(gateway.port, 4000);
        assert_eq!(gateway.backend.host, "localhost");
        assert_eq!(gateway.cors.max_age.as_duration(), "1h");
        assert_eq!(gateway.cors.allow_origins, vec!["*".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn test_discover_falls_back_to_defaults() -> crate::Result<()> {
        let dir = tempdir()?;
        let spec = dir.path().join("openapi.json");
        let config = CodegenConfig::discover(None, &spec).await?;
        assert_eq!(config.license, "Apache-2.0");

        tokio::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "author: Jane\n").await?;
        let config = CodegenConfig::discover(None, &spec).await?;
        assert_eq!(config.author, "Jane");

        Ok(())
    }
}
