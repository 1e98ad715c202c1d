//! agentgateway configuration exposing the enhanced spec as MCP tools.

use std::path::Path;

use serde::Serialize;

use crate::config::AgentGatewayConfig;

/// File name written next to the enhanced spec
pub const GATEWAY_CONFIG_FILE: &str = "agw.yaml";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayDocument {
    pub binds: Vec<Bind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bind {
    pub port: u16,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listener {
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub policies: Policies,
    pub backends: Vec<Backend>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Policies {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backend {
    pub mcp: McpBackend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpBackend {
    pub targets: Vec<McpTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpTarget {
    pub name: String,
    pub openapi: OpenApiTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenApiTarget {
    pub schema: SchemaSource,
    pub host: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSource {
    pub file: String,
}

impl GatewayDocument {
    /// Gateway config serving the spec stored at `schema_file`
    pub fn new(config: &AgentGatewayConfig, schema_file: &str) -> Self {
        let cors = config.cors.enabled.then(|| CorsPolicy {
            allow_origins: config.cors.allow_origins.clone(),
            allow_methods: config.cors.allow_methods.clone(),
            allow_headers: config.cors.allow_headers.clone(),
            expose_headers: config.cors.expose_headers.clone(),
            max_age: config.cors.max_age.as_duration(),
        });

        Self {
            binds: vec![Bind {
                port: config.port,
                listeners: vec![Listener {
                    routes: vec![Route {
                        policies: Policies { cors },
                        backends: vec![Backend {
                            mcp: McpBackend {
                                targets: vec![McpTarget {
                                    name: "openapi".to_string(),
                                    openapi: OpenApiTarget {
                                        schema: SchemaSource {
                                            file: schema_file.to_string(),
                                        },
                                        host: config.backend.host.clone(),
                                        port: config.backend.port,
                                        path: config.backend.path.clone(),
                                    },
                                }],
                            },
                        }],
                    }],
                }],
            }],
        }
    }

    pub fn to_yaml(&self) -> crate::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Write `agw.yaml` beside `enhanced_spec`, pointing at it by file name
pub async fn write_gateway_config(
    config: &AgentGatewayConfig,
    enhanced_spec: &Path,
) -> crate::Result<std::path::PathBuf> {
    let schema_file = enhanced_spec
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            crate::Error::config(format!(
                "Invalid enhanced spec path: {}",
                enhanced_spec.display()
            ))
        })?;
    let output = enhanced_spec
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(GATEWAY_CONFIG_FILE);

    let document = GatewayDocument::new(config, &schema_file);
    tokio::fs::write(&output, document.to_yaml()?).await?;
    log::info!(
        "Generated agentgateway config {} (port {}, backend {}:{}{})",
        output.display(),
        config.port,
        config.backend.host,
        config.backend.port,
        config.backend.path
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxAge;

    #[test]
    fn test_default_document() -> crate::Result<()> {
        let yaml = GatewayDocument::new(&AgentGatewayConfig::default(), "enhanced_openapi.json").to_yaml()?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
        let route = &parsed["binds"][0]["listeners"][0]["routes"][0];

        assert_eq!(parsed["binds"][0]["port"].as_u64(), Some(3000));
        assert_eq!(route["policies"]["cors"]["maxAge"].as_str(), Some("3600s"));
        assert_eq!(
            route["policies"]["cors"]["exposeHeaders"][0].as_str(),
            Some("mcp-protocol-version")
        );
        let target = &route["backends"][0]["mcp"]["targets"][0];
        assert_eq!(target["name"].as_str(), Some("openapi"));
        assert_eq!(target["openapi"]["schema"]["file"].as_str(), Some("enhanced_openapi.json"));
        assert_eq!(target["openapi"]["host"].as_str(), Some("localhost"));
        Ok(())
    }

    #[test]
    fn test_cors_disabled() -> crate::Result<()> {
        let mut config = AgentGatewayConfig::default();
        config.cors.enabled = false;
        config.cors.max_age = MaxAge::Duration("1h".to_string());
        let yaml = GatewayDocument::new(&config, "spec.json").to_yaml()?;
        assert!(!yaml.contains("cors"));
        Ok(())
    }

    #[tokio::test]
    async fn test_written_beside_spec() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let spec = dir.path().join("enhanced.json");
        let written = write_gateway_config(&AgentGatewayConfig::default(), &spec).await?;
        assert_eq!(written, dir.path().join(GATEWAY_CONFIG_FILE));
        let content = tokio::fs::read_to_string(&written).await?;
        assert!(content.contains("file: enhanced.json"));
        Ok(())
    }
}
