//! Static checks over the tool functions of an emitted MCP project.
//!
//! Tool modules are scanned for top-level `async def` definitions and
//! `server.py` for `mcp.tool()(module.func)` registrations. Names must be
//! unique across the project, fit the length limits, be registered, and
//! prefer the known abbreviations.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// Names longer than this fail validation
pub const HARD_LENGTH_LIMIT: usize = 64;
/// Names longer than this produce a warning
pub const TARGET_LENGTH: usize = 30;

const ABBREVIATIONS: [(&str, &str); 9] = [
    ("workflow", "wf"),
    ("template", "tpl"),
    ("service", "svc"),
    ("cluster", "clust"),
    ("archived", "arch"),
    ("namespace", "ns"),
    ("artifact", "art"),
    ("event_source", "evt_src"),
    ("cron_workflow", "cron_wf"),
];

// Line scans over generated sources, not a Python parser. Only `async def`
// at column zero is seen, so methods and nested functions are missed.
static ASYNC_DEF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^async\s+def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("Invalid regex pattern")
});
// Matches the `mcp.tool()(module.func)` call form the server template emits.
// Functions registered with an `@mcp.tool()` decorator are not seen.
static REGISTRATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"mcp\.tool\(\)\([^.]+\.([^)]+)\)").expect("Invalid regex pattern"));

/// One tool function definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub file: PathBuf,
    pub line: usize,
    pub module: String,
}

impl FunctionInfo {
    pub fn len(&self) -> usize {
        self.name.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Verdict for a single project
#[derive(Debug, Clone, Default)]
pub struct ProjectValidation {
    pub project: String,
    pub functions: Vec<FunctionInfo>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duplicates: BTreeMap<String, Vec<PathBuf>>,
    pub length_violations: Vec<FunctionInfo>,
    pub unregistered: Vec<FunctionInfo>,
    pub naming_violations: Vec<FunctionInfo>,
}

impl ProjectValidation {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Top-level `async def` names with 1-based line numbers
pub fn scan_functions(source: &str) -> Vec<(String, usize)> {
    ASYNC_DEF
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line = source[..whole.start()].matches('\n').count() + 1;
            Some((caps[1].to_string(), line))
        })
        .collect()
}

/// Function names registered in a `server.py`
pub fn scan_registrations(source: &str) -> HashSet<String> {
    REGISTRATION
        .captures_iter(source)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// Abbreviation a name should use instead of a full word, if any
pub fn abbreviation_hint(name: &str) -> Option<(&'static str, &'static str)> {
    ABBREVIATIONS
        .iter()
        .find(|(full, abbrev)| name.contains(full) && !name.contains(abbrev))
        .copied()
}

/// Validates emitted projects
#[derive(Debug, Clone, Copy)]
pub struct FunctionValidator {
    pub target_length: usize,
    pub max_length: usize,
}

impl Default for FunctionValidator {
    fn default() -> Self {
        Self {
            target_length: TARGET_LENGTH,
            max_length: HARD_LENGTH_LIMIT,
        }
    }
}

impl FunctionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_length(mut self, target: usize) -> Self {
        self.target_length = target;
        self
    }

    /// Project directories under `root`: `root` itself when it has a
    /// `tools/` directory, otherwise every `mcp_*` directory below it.
    pub async fn discover_projects(root: &Path) -> crate::Result<Vec<PathBuf>> {
        if tokio::fs::metadata(root.join("tools")).await.is_ok() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut found = Vec::new();
        let mut pending = vec![(root.to_path_buf(), 0usize)];
        while let Some((dir, depth)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let path = entry.path();
                let is_project = entry.file_name().to_string_lossy().starts_with("mcp_");
                if is_project && tokio::fs::metadata(path.join("tools")).await.is_ok() {
                    found.push(path);
                } else if depth < 3 {
                    pending.push((path, depth + 1));
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Validate every project found under `roots`.
    ///
    /// A root with no projects below it is an error.
    pub async fn validate_all(&self, roots: &[PathBuf]) -> crate::Result<FunctionReport> {
        let mut report = FunctionReport::default();
        for root in roots {
            let projects = Self::discover_projects(root).await?;
            if projects.is_empty() {
                return Err(crate::Error::config(format!(
                    "No generated MCP projects found under {}",
                    root.display()
                )));
            }
            log::info!("Found {} MCP projects under {}", projects.len(), root.display());
            for project in projects {
                report.projects.push(self.validate_project(&project).await?);
            }
        }
        Ok(report)
    }

    pub async fn validate_project(&self, project_dir: &Path) -> crate::Result<ProjectValidation> {
        log::info!("Validating MCP project: {}", project_dir.display());
        let mut result = ProjectValidation {
            project: project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| project_dir.display().to_string()),
            ..ProjectValidation::default()
        };

        let tools_dir = project_dir.join("tools");
        if tokio::fs::metadata(&tools_dir).await.is_err() {
            result
                .errors
                .push(format!("Tools directory not found: {}", tools_dir.display()));
            return Ok(result);
        }

        let mut tool_files = Vec::new();
        let mut entries = tokio::fs::read_dir(&tools_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_module = path.extension().map_or(false, |ext| ext == "py");
            if is_module && entry.file_name() != "__init__.py" {
                tool_files.push(path);
            }
        }
        tool_files.sort();

        for file in tool_files {
            let source = tokio::fs::read_to_string(&file).await?;
            let module = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            for (name, line) in scan_functions(&source) {
                result.functions.push(FunctionInfo {
                    name,
                    file: file.clone(),
                    line,
                    module: module.clone(),
                });
            }
        }

        let server = project_dir.join("server.py");
        let registered = match tokio::fs::read_to_string(&server).await {
            Ok(source) => scan_registrations(&source),
            Err(_) => {
                result
                    .warnings
                    .push(format!("Server file not found: {}", server.display()));
                HashSet::new()
            }
        };

        self.check(&mut result, &registered);
        Ok(result)
    }

    fn check(&self, result: &mut ProjectValidation, registered: &HashSet<String>) {
        let mut by_name: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for func in &result.functions {
            by_name.entry(func.name.clone()).or_default().push(func.file.clone());
        }
        result.duplicates = by_name.into_iter().filter(|(_, files)| files.len() > 1).collect();
        for (name, files) in &result.duplicates {
            log::error!("'{}' defined in: {:?}", name, files);
        }

        for func in &result.functions {
            if func.len() > self.max_length {
                log::error!(
                    "Function '{}' ({} chars) exceeds hard limit ({})",
                    func.name,
                    func.len(),
                    self.max_length
                );
                result.length_violations.push(func.clone());
            } else if func.len() > self.target_length {
                log::warn!(
                    "Function '{}' ({} chars) exceeds target ({})",
                    func.name,
                    func.len(),
                    self.target_length
                );
                result.warnings.push(format!(
                    "Function '{}' ({} chars) exceeds target length of {}",
                    func.name,
                    func.len(),
                    self.target_length
                ));
            }

            if !registered.contains(&func.name) {
                log::error!("Function '{}' not registered in server.py", func.name);
                result.unregistered.push(func.clone());
            }

            if let Some((full, abbrev)) = abbreviation_hint(&func.name) {
                log::warn!("Function '{}' should use '{}' instead of '{}'", func.name, abbrev, full);
                result.naming_violations.push(func.clone());
            }
        }

        if !result.duplicates.is_empty() {
            let listing = result
                .duplicates
                .iter()
                .map(|(name, files)| {
                    let files = files
                        .iter()
                        .map(|f| f.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("'{}' in {}", name, files)
                })
                .collect::<Vec<_>>()
                .join("; ");
            result.errors.push(format!(
                "Found {} duplicate function names: {}",
                result.duplicates.len(),
                listing
            ));
        }
        if !result.length_violations.is_empty() {
            result.errors.push(format!(
                "Found {} functions exceeding length limits",
                result.length_violations.len()
            ));
        }
        if !result.unregistered.is_empty() {
            result.errors.push(format!(
                "Found {} unregistered functions",
                result.unregistered.len()
            ));
        }
        if !result.naming_violations.is_empty() {
            result.warnings.push(format!(
                "Found {} functions with naming convention issues",
                result.naming_violations.len()
            ));
        }
    }
}

/// Aggregated verdict over several projects
#[derive(Debug, Clone, Default)]
pub struct FunctionReport {
    pub projects: Vec<ProjectValidation>,
}

impl FunctionReport {
    pub fn passed(&self) -> bool {
        self.projects.iter().all(ProjectValidation::passed)
    }

    pub fn total_functions(&self) -> usize {
        self.projects.iter().map(|p| p.functions.len()).sum()
    }

    pub fn render(&self) -> String {
        let rule = "=".repeat(80);
        let errors: usize = self.projects.iter().map(|p| p.errors.len()).sum();
        let warnings: usize = self.projects.iter().map(|p| p.warnings.len()).sum();
        let passed = self.projects.iter().filter(|p| p.passed()).count();
        let status = if self.passed() { "PASSED" } else { "FAILED" };

        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "MCP FUNCTION VALIDATION REPORT");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out);
        let _ = writeln!(out, "OVERALL RESULT: {}", status);
        let _ = writeln!(out, "Projects Validated: {} ({} passed)", self.projects.len(), passed);
        let _ = writeln!(out, "Total Functions: {}", self.total_functions());
        let _ = writeln!(out, "Total Errors: {}", errors);
        let _ = writeln!(out, "Total Warnings: {}", warnings);
        let _ = writeln!(out);

        for project in &self.projects {
            let marker = if project.passed() { "[PASS]" } else { "[FAIL]" };
            let _ = writeln!(out, "{} {}:", marker, project.project);
            let _ = writeln!(out, "   Functions: {}", project.functions.len());
            let _ = writeln!(out, "   Errors: {}", project.errors.len());
            let _ = writeln!(out, "   Warnings: {}", project.warnings.len());
            for error in &project.errors {
                let _ = writeln!(out, "   ERROR: {}", error);
            }
            for warning in &project.warnings {
                let _ = writeln!(out, "   WARNING: {}", warning);
            }
            if !project.duplicates.is_empty() {
                let _ = writeln!(out, "   Duplicate Functions:");
                for (name, files) in &project.duplicates {
                    let _ = writeln!(out, "      '{}' in {} files", name, files.len());
                }
            }
            if !project.length_violations.is_empty() {
                let _ = writeln!(out, "   Length Violations:");
                for func in &project.length_violations {
                    let _ = writeln!(out, "      '{}' ({} chars)", func.name, func.len());
                }
            }
            if !project.unregistered.is_empty() {
                let _ = writeln!(out, "   Unregistered Functions:");
                for func in &project.unregistered {
                    let _ = writeln!(out, "      '{}' in {}:{}", func.name, func.module, func.line);
                }
            }
            let _ = writeln!(out);
        }

        if !self.projects.is_empty() {
            let _ = writeln!(
                out,
                "Average Functions per Project: {:.1}",
                self.total_functions() as f64 / self.projects.len() as f64
            );
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "VALIDATION COMPLETE: {}", status);
        let _ = writeln!(out, "{}", rule);
        out
    }
}
