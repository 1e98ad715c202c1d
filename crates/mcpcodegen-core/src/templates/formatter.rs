//! External source formatters run over rendered files.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Default time a formatter process may run
pub const FORMATTER_TIMEOUT: Duration = Duration::from_secs(300);

/// Formats a file in place
#[async_trait]
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this formatter understands `path`
    fn supports(&self, path: &Path) -> bool;

    async fn format(&self, path: &Path) -> crate::Result<()>;
}

/// Runs `ruff format <file>` on Python sources
#[derive(Debug)]
pub struct RuffFormatter {
    program: String,
    timeout: Duration,
    missing_reported: AtomicBool,
}

impl Default for RuffFormatter {
    fn default() -> Self {
        Self::new("ruff")
    }
}

impl RuffFormatter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: FORMATTER_TIMEOUT,
            missing_reported: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Formatter for RuffFormatter {
    fn name(&self) -> &str {
        "ruff"
    }

    fn supports(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("py") | Some("pyi")
        )
    }

    async fn format(&self, path: &Path) -> crate::Result<()> {
        let run = Command::new(&self.program)
            .arg("format")
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                return Err(crate::Error::template(format!(
                    "{} timed out after {}s on {}",
                    self.program,
                    self.timeout.as_secs(),
                    path.display()
                )))
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                if !self.missing_reported.swap(true, Ordering::Relaxed) {
                    log::warn!("Formatter '{}' not found on PATH", self.program);
                }
                return Err(crate::Error::template(format!(
                    "Formatter '{}' is not installed",
                    self.program
                )));
            }
            Ok(result) => result?,
        };

        if !output.status.success() {
            return Err(crate::Error::template(format!(
                "{} failed with status {} on {}\n{}{}",
                self.program,
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr),
                String::from_utf8_lossy(&output.stdout)
            )));
        }
        Ok(())
    }
}

/// Leaves files untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormatter;

#[async_trait]
impl Formatter for NoopFormatter {
    fn name(&self) -> &str {
        "none"
    }

    fn supports(&self, _path: &Path) -> bool {
        false
    }

    async fn format(&self, _path: &Path) -> crate::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruff_supports_python_only() {
        let ruff = RuffFormatter::default();
        assert!(ruff.supports(Path::new("tools/pets.py")));
        assert!(!ruff.supports(Path::new("pyproject.toml")));
        assert!(!ruff.supports(Path::new("README.md")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("a.py");
        tokio::fs::write(&file, "x=1\n").await?;

        let ruff = RuffFormatter::new("definitely-not-a-formatter-binary");
        assert!(ruff.format(&file).await.is_err());
        assert!(ruff.format(&file).await.is_err());
        assert!(ruff.missing_reported.load(Ordering::Relaxed));
        Ok(())
    }

    #[tokio::test]
    async fn test_noop() -> crate::Result<()> {
        NoopFormatter.format(Path::new("missing.py")).await
    }
}
