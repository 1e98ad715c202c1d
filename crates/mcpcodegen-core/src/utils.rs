//! String transformation utilities for code generation, plus the atomic
//! file write used for emitted files

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

static CAPITALIZED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("Invalid regex pattern"));
static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("Invalid regex pattern"));
static UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("Invalid regex pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

/// Convert a string to snake_case
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let mut prev_is_lowercase = false;

    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            // Add underscore before uppercase letter if:
            // - Not at the start
            // - Previous character was lowercase
            if i > 0 && prev_is_lowercase {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
            prev_is_lowercase = false;
        } else if ch.is_alphanumeric() {
            result.push(ch);
            prev_is_lowercase = ch.is_lowercase();
        } else if ch == '-' || ch == '_' || ch == ' ' {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            prev_is_lowercase = false;
        }
    }

    UNDERSCORES
        .replace_all(&result, "_")
        .trim_matches('_')
        .to_string()
}

/// Convert CamelCase to snake_case, splitting acronyms from the following word.
///
/// An all-caps alphabetic name is spelled out letter by letter (`XYZ` -> `x_y_z`).
pub fn camel_to_snake(name: &str) -> String {
    let has_cased = name.chars().any(char::is_alphabetic);
    if has_cased && name.chars().all(|c| c.is_ascii_uppercase()) {
        let spelled: Vec<String> = name.chars().map(|c| c.to_ascii_lowercase().to_string()).collect();
        return spelled.join("_");
    }
    let s1 = CAPITALIZED_WORD.replace_all(name, "${1}_${2}");
    let s2 = LOWER_UPPER.replace_all(&s1, "${1}_${2}").to_lowercase();
    UNDERSCORES.replace_all(&s2, "_").to_string()
}

/// Turn an `operationId` into the emitted Python function name
pub fn function_name(operation_id: &str) -> String {
    let stripped: String = operation_id
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let snake = camel_to_snake(&stripped);
    let name = snake.trim_matches('_').to_string();
    match name.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("op_{}", name),
        Some(_) => name,
        None => "operation".to_string(),
    }
}

/// Module stem for the tool module of an API path.
///
/// Strips the leading `/`, maps `/`, `-` and `.` to `_`, drops braces and
/// lowercases. The root path becomes `root`.
pub fn path_to_module_name(path: &str) -> String {
    let name: String = path
        .trim_start_matches('/')
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| match c {
            '/' | '-' | '.' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();
    if name.is_empty() {
        "root".to_string()
    } else {
        name
    }
}

/// Replace every character that cannot appear in a Python identifier with `_`
pub fn python_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Convert a string to UpperCamelCase (PascalCase)
pub fn to_upper_camel_case(s: &str) -> String {
    // First convert to snake_case to normalize the input
    let snake = to_snake_case(s);

    // Then split on underscores and capitalize each word
    snake
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// Collapse runs of whitespace into single spaces and trim
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

/// Cap `s` at `max` characters, marking the cut with `...`
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Cap `s` at `max` characters without a marker
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Sibling path `content` is staged in before it replaces `path`
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `content` to `path` through a sibling temp file and a rename, so
/// readers see either the old file or the complete new one. The temp file is
/// removed when the write or the rename fails.
pub async fn write_atomic(path: &Path, content: impl AsRef<[u8]>) -> std::io::Result<()> {
    let staging = staging_path(path);
    let result = match tokio::fs::write(&staging, content).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}
