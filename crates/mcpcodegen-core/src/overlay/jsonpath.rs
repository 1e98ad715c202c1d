//! The JSONPath subset used by overlay targets.
//!
//! Supported: `$`, dotted names, `*`, bracketed quoted keys (`['/pets']`),
//! key lists (`['get','post']`) and numeric indices (`[0]`). Recursive
//! descent and filter expressions are rejected at parse time.

use serde_json::Value as JsonValue;

/// One segment of a parsed target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Keys(Vec<String>),
    Wildcard,
}

/// A concrete step into the document produced by matching
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Key(String),
    Index(usize),
}

impl Step {
    /// Whether the step would address a list when creating containers
    fn is_numeric(&self) -> bool {
        match self {
            Step::Index(_) => true,
            Step::Key(k) => !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()),
        }
    }

    fn as_index(&self) -> Option<usize> {
        match self {
            Step::Index(i) => Some(*i),
            Step::Key(k) => k.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    pub segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(target: &str) -> crate::Result<Self> {
        let err = |msg: &str| crate::Error::overlay(format!("invalid JSONPath '{}': {}", target, msg));
        let chars: Vec<char> = target.trim().chars().collect();
        if chars.first() != Some(&'$') {
            return Err(err("must start with '$'"));
        }

        let mut segments = Vec::new();
        let mut pos = 1;
        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    if chars.get(pos) == Some(&'.') {
                        return Err(err("recursive descent is not supported"));
                    }
                    let start = pos;
                    while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                        pos += 1;
                    }
                    let name: String = chars[start..pos].iter().collect();
                    match name.as_str() {
                        "" => return Err(err("empty name after '.'")),
                        "*" => segments.push(Segment::Wildcard),
                        _ => segments.push(Segment::Key(name)),
                    }
                }
                '[' => {
                    pos += 1;
                    let (segment, next) = parse_bracket(&chars, pos).map_err(|m| err(&m))?;
                    segments.push(segment);
                    pos = next;
                }
                other => return Err(err(&format!("unexpected character '{}'", other))),
            }
        }
        Ok(Self { segments })
    }

    /// Whether every segment names exactly one location
    pub fn is_singular(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Key(_) | Segment::Index(_)))
    }

    /// The concrete steps of a singular path
    pub fn steps(&self) -> Option<Vec<Step>> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => Some(Step::Key(k.clone())),
                Segment::Index(i) => Some(Step::Index(*i)),
                _ => None,
            })
            .collect()
    }

    /// All existing locations matched by this path, in document order
    pub fn find(&self, root: &JsonValue) -> Vec<Vec<Step>> {
        let mut found: Vec<(Vec<Step>, &JsonValue)> = vec![(Vec::new(), root)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (steps, node) in found {
                match (segment, node) {
                    (Segment::Key(k), JsonValue::Object(map)) => {
                        if let Some(child) = map.get(k) {
                            next.push((with(&steps, Step::Key(k.clone())), child));
                        }
                    }
                    (Segment::Key(k), JsonValue::Array(items)) => {
                        if let Some((i, child)) = k.parse::<usize>().ok().and_then(|i| items.get(i).map(|c| (i, c))) {
                            next.push((with(&steps, Step::Index(i)), child));
                        }
                    }
                    (Segment::Index(i), JsonValue::Array(items)) => {
                        if let Some(child) = items.get(*i) {
                            next.push((with(&steps, Step::Index(*i)), child));
                        }
                    }
                    (Segment::Keys(keys), JsonValue::Object(map)) => {
                        for k in keys {
                            if let Some(child) = map.get(k) {
                                next.push((with(&steps, Step::Key(k.clone())), child));
                            }
                        }
                    }
                    (Segment::Wildcard, JsonValue::Object(map)) => {
                        for (k, child) in map {
                            next.push((with(&steps, Step::Key(k.clone())), child));
                        }
                    }
                    (Segment::Wildcard, JsonValue::Array(items)) => {
                        for (i, child) in items.iter().enumerate() {
                            next.push((with(&steps, Step::Index(i)), child));
                        }
                    }
                    _ => {}
                }
            }
            found = next;
        }
        found.into_iter().map(|(steps, _)| steps).collect()
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(k) => write!(f, "['{}']", k)?,
                Segment::Index(i) => write!(f, "[{}]", i)?,
                Segment::Keys(keys) => {
                    let quoted: Vec<String> = keys.iter().map(|k| format!("'{}'", k)).collect();
                    write!(f, "[{}]", quoted.join(","))?
                }
                Segment::Wildcard => write!(f, ".*")?,
            }
        }
        Ok(())
    }
}

fn with(steps: &[Step], step: Step) -> Vec<Step> {
    let mut out = steps.to_vec();
    out.push(step);
    out
}

/// Parse the inside of `[...]` starting after the `[`; returns the segment and
/// the position after the closing `]`
fn parse_bracket(chars: &[char], mut pos: usize) -> Result<(Segment, usize), String> {
    match chars.get(pos) {
        Some('*') => {
            if chars.get(pos + 1) != Some(&']') {
                return Err("expected ']' after '*'".to_string());
            }
            Ok((Segment::Wildcard, pos + 2))
        }
        Some('\'') | Some('"') => {
            let mut keys = Vec::new();
            loop {
                let quote = match chars.get(pos) {
                    Some(q @ ('\'' | '"')) => *q,
                    _ => return Err("expected quoted key".to_string()),
                };
                pos += 1;
                let mut key = String::new();
                loop {
                    match chars.get(pos) {
                        None => return Err("unterminated string".to_string()),
                        Some('\\') => {
                            if let Some(c) = chars.get(pos + 1) {
                                key.push(*c);
                            }
                            pos += 2;
                        }
                        Some(c) if *c == quote => {
                            pos += 1;
                            break;
                        }
                        Some(c) => {
                            key.push(*c);
                            pos += 1;
                        }
                    }
                }
                keys.push(key);
                while chars.get(pos) == Some(&' ') {
                    pos += 1;
                }
                match chars.get(pos) {
                    Some(',') => {
                        pos += 1;
                        while chars.get(pos) == Some(&' ') {
                            pos += 1;
                        }
                    }
                    Some(']') => {
                        pos += 1;
                        break;
                    }
                    _ => return Err("expected ',' or ']'".to_string()),
                }
            }
            let segment = if keys.len() == 1 {
                Segment::Key(keys.remove(0))
            } else {
                Segment::Keys(keys)
            };
            Ok((segment, pos))
        }
        Some(c) if c.is_ascii_digit() => {
            let start = pos;
            while chars.get(pos).map_or(false, char::is_ascii_digit) {
                pos += 1;
            }
            if chars.get(pos) != Some(&']') {
                return Err("expected ']' after index".to_string());
            }
            let digits: String = chars[start..pos].iter().collect();
            let index = digits.parse().map_err(|_| "index out of range".to_string())?;
            Ok((Segment::Index(index), pos + 1))
        }
        _ => Err("unsupported bracket expression".to_string()),
    }
}

/// Mutable access to the node at `steps`
pub fn node_mut<'a>(root: &'a mut JsonValue, steps: &[Step]) -> Option<&'a mut JsonValue> {
    let mut current = root;
    for step in steps {
        current = match current {
            JsonValue::Object(map) => match step {
                Step::Key(k) => map.get_mut(k)?,
                Step::Index(i) => map.get_mut(&i.to_string())?,
            },
            JsonValue::Array(items) => items.get_mut(step.as_index()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `steps`, creating missing containers on the way.
///
/// A missing intermediate becomes a list when the following step is numeric
/// and a map otherwise. Lists are padded with empty maps (intermediate) or
/// nulls (final position).
pub fn set_creating(root: &mut JsonValue, steps: &[Step], value: JsonValue) -> crate::Result<()> {
    let Some((last, parents)) = steps.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for (i, step) in parents.iter().enumerate() {
        let next_is_numeric = steps[i + 1].is_numeric();
        current = descend_creating(current, step, next_is_numeric)?;
    }

    match current {
        JsonValue::Array(items) if last.is_numeric() => {
            let idx = last.as_index().unwrap_or(items.len());
            while items.len() <= idx {
                items.push(JsonValue::Null);
            }
            items[idx] = value;
        }
        JsonValue::Object(map) => {
            let key = match last {
                Step::Key(k) => k.clone(),
                Step::Index(i) => i.to_string(),
            };
            map.insert(key, value);
        }
        _ => {
            return Err(crate::Error::overlay(format!(
                "cannot set {:?} inside a scalar value",
                last
            )))
        }
    }
    Ok(())
}

fn descend_creating<'a>(
    node: &'a mut JsonValue,
    step: &Step,
    next_is_numeric: bool,
) -> crate::Result<&'a mut JsonValue> {
    let fresh = || {
        if next_is_numeric {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(serde_json::Map::new())
        }
    };
    match node {
        JsonValue::Array(items) if step.is_numeric() => {
            let idx = step.as_index().unwrap_or(items.len());
            while items.len() <= idx {
                items.push(JsonValue::Object(serde_json::Map::new()));
            }
            if items[idx].is_null() {
                items[idx] = fresh();
            }
            Ok(&mut items[idx])
        }
        JsonValue::Object(map) => {
            let key = match step {
                Step::Key(k) => k.clone(),
                Step::Index(i) => i.to_string(),
            };
            let child = map.entry(key).or_insert_with(fresh);
            if child.is_null() {
                *child = fresh();
            }
            Ok(child)
        }
        _ => Err(crate::Error::overlay(format!(
            "cannot descend into {:?} of a non-container value",
            step
        ))),
    }
}

/// Delete the node at `steps`; returns whether something was removed
pub fn remove_at(root: &mut JsonValue, steps: &[Step]) -> bool {
    let Some((last, parents)) = steps.split_last() else {
        return false;
    };
    match node_mut(root, parents) {
        Some(JsonValue::Object(map)) => {
            let key = match last {
                Step::Key(k) => k.clone(),
                Step::Index(i) => i.to_string(),
            };
            map.shift_remove(&key).is_some()
        }
        Some(JsonValue::Array(items)) => match last.as_index() {
            Some(idx) if idx < items.len() => {
                items.remove(idx);
                true
            }
            _ => false,
        },
        _ => false,
    }
}
