//! Declarative prompt templates for LLM-assisted descriptions.
//!
//! A prompt file is YAML with `operation_description` and
//! `parameter_description` entries (plus optional `tool_docstring` and
//! `agent_system_prompt`), each holding a `system_prompt` and a
//! `user_prompt_template` with brace-style named slots such as `{method}`.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use tokio::fs;

const BUILTIN_PROMPTS: &str = include_str!("../prompts/default.yaml");

/// A system prompt plus a user prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPair {
    pub system_prompt: String,
    pub user_prompt_template: String,
}

impl PromptPair {
    /// Trimmed system prompt and the user template with `slots` substituted
    pub fn render(&self, slots: &[(&str, String)]) -> (String, String) {
        (
            self.system_prompt.trim().to_string(),
            format_template(&self.user_prompt_template, slots).trim().to_string(),
        )
    }
}

/// Prompt templates, read-only once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRegistry {
    pub operation_description: PromptPair,
    pub parameter_description: PromptPair,
    #[serde(default)]
    pub tool_docstring: Option<PromptPair>,
    #[serde(default)]
    pub agent_system_prompt: Option<PromptPair>,
}

impl PromptRegistry {
    /// Prompts compiled into the library
    pub fn builtin() -> crate::Result<Self> {
        Self::parse(BUILTIN_PROMPTS)
    }

    pub fn parse(content: &str) -> crate::Result<Self> {
        let registry: Self = serde_yaml::from_str(content)?;
        for (name, pair) in [
            ("operation_description", &registry.operation_description),
            ("parameter_description", &registry.parameter_description),
        ] {
            if pair.system_prompt.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "prompt '{}' has an empty system_prompt",
                    name
                )));
            }
        }
        Ok(registry)
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Per-user prompt override location
    pub fn user_prompt_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mcpcodegen").join("prompts.yaml"))
    }

    /// Load prompts from `explicit`, else the per-user file, else the builtin set.
    ///
    /// Returns `None` when the chosen source fails to load; callers then use
    /// rule-based descriptions for the whole run.
    pub async fn locate(explicit: Option<&Path>) -> Option<Self> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::user_prompt_path()
                .filter(|p| p.is_file()),
        };

        let loaded = match &candidate {
            Some(path) => {
                log::debug!("Loading prompts from {}", path.display());
                Self::from_file(path).await
            }
            None => Self::builtin(),
        };

        match loaded {
            Ok(registry) => Some(registry),
            Err(e) => {
                log::warn!(
                    "Failed to load prompt registry{}: {}; using rule-based descriptions",
                    candidate
                        .map(|p| format!(" from {}", p.display()))
                        .unwrap_or_default(),
                    e
                );
                None
            }
        }
    }
}

/// Substitute `{name}` slots; `{{` and `}}` produce literal braces.
///
/// Slots with no value are left untouched.
pub fn format_template(template: &str, slots: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                match slots.iter().find(|(slot, _)| *slot == name) {
                    Some((_, value)) if closed => out.push_str(value),
                    _ => {
                        out.push('{');
                        out.push_str(&name);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_template() {
        let slots = [("method", "GET".to_string()), ("path", "/pets".to_string())];
        assert_eq!(
            format_template("API: {method} {path} {{literal}} {unknown}", &slots),
            "API: GET /pets {literal} {unknown}"
        );
        assert_eq!(format_template("open {method", &slots), "open {method");
    }

    #[test]
    fn test_builtin_prompts_parse() -> crate::Result<()> {
        let registry = PromptRegistry::builtin()?;
        assert!(registry.tool_docstring.is_some());
        let (system, user) = registry.operation_description.render(&[
            ("method", "GET".to_string()),
            ("path", "/pets".to_string()),
            ("operation_id", "listPets".to_string()),
            ("summary", "None".to_string()),
            ("description", "None".to_string()),
            ("path_params", "None".to_string()),
            ("query_params", "limit".to_string()),
            ("has_body", "No".to_string()),
        ]);
        assert!(!system.is_empty());
        assert!(user.starts_with("API: GET /pets"));
        assert!(user.contains("Query parameters: limit"));
        Ok(())
    }

    #[tokio::test]
    async fn test_locate_reports_broken_file_as_none() -> crate::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("prompts.yaml");
        tokio::fs::write(&path, "operation_description: [unterminated").await?;
        assert!(PromptRegistry::locate(Some(&path)).await.is_none());

        tokio::fs::write(
            &path,
            "operation_description:\n  system_prompt: s\n  user_prompt_template: u\nparameter_description:\n  system_prompt: p\n  user_prompt_template: q\n",
        )
        .await?;
        let registry = PromptRegistry::locate(Some(&path)).await;
        assert_eq!(
            registry.map(|r| r.parameter_description.system_prompt),
            Some("p".to_string())
        );
        Ok(())
    }
}
