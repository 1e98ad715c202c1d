//! OpenAPI Overlay 1.0 documents: generation, JSONPath targeting and application.

pub mod applier;
pub mod generator;
pub mod jsonpath;

// Internal imports (std, crate)
use std::path::Path;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::fs;

pub use applier::{ApplyStats, OverlayApplier};
pub use generator::{GenerationStats, OverlayGenerator};

/// Overlay specification version written by the generator
pub const OVERLAY_VERSION: &str = "1.0.0";

/// Serialization format for overlays and specs written to disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayInfo {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One edit addressed by a JSONPath target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayAction {
    /// JSONPath expression, e.g. `$.paths['/pets'].get.description`
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<bool>,
}

impl OverlayAction {
    pub fn update(target: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            target: target.into(),
            update: Some(value.into()),
            remove: None,
        }
    }

    pub fn remove(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            update: None,
            remove: Some(true),
        }
    }
}

/// An overlay document; `actions` are applied in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDocument {
    pub overlay: String,
    pub info: OverlayInfo,
    #[serde(default)]
    pub actions: Vec<OverlayAction>,
}

impl OverlayDocument {
    pub fn new(info: OverlayInfo) -> Self {
        Self {
            overlay: OVERLAY_VERSION.to_string(),
            info,
            actions: Vec::new(),
        }
    }

    /// Parse YAML or JSON
    pub fn parse(content: &str) -> crate::Result<Self> {
        if let Ok(doc) = serde_json::from_str(content) {
            return Ok(doc);
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        Self::parse(&content).map_err(|e| {
            crate::Error::overlay(format!("Failed to parse overlay {}: {}", path.display(), e))
        })
    }

    pub fn to_string_as(&self, format: OutputFormat) -> crate::Result<String> {
        Ok(match format {
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
        })
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat) -> crate::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_string_as(format)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn doc() -> OverlayDocument {
        let mut doc = OverlayDocument::new(OverlayInfo {
            title: "Overlay".to_string(),
            version: "1.0.0".to_string(),
            description: None,
        });
        doc.actions
            .push(OverlayAction::update("$.info.description", "Hello"));
        doc.actions.push(OverlayAction::remove("$.info.x-internal"));
        doc
    }

    #[tokio::test]
    async fn test_save_and_load_both_formats() -> crate::Result<()> {
        let dir = tempdir()?;
        for format in [OutputFormat::Yaml, OutputFormat::Json] {
            let path = dir.path().join(format!("overlay.{}", format.extension()));
            doc().save(&path, format).await?;
            let loaded = OverlayDocument::from_file(&path).await?;
            assert_eq!(loaded, doc());
        }
        Ok(())
    }

    #[test]
    fn test_yaml_shape() -> crate::Result<()> {
        let yaml = doc().to_string_as(OutputFormat::Yaml)?;
        assert!(yaml.starts_with("overlay: 1.0.0"));
        assert!(yaml.contains("update: Hello"));
        assert!(yaml.contains("remove: true"));
        Ok(())
    }
}
