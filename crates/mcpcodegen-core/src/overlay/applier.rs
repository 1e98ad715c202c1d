//! Applies overlay actions to a spec tree in document order.

use serde_json::Value as JsonValue;

use super::jsonpath::{self, JsonPath};
use super::{OverlayAction, OverlayDocument};

/// Counters from one application run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Actions that changed the document
    pub applied: usize,
    /// Actions skipped because they were malformed or failed
    pub skipped: usize,
    /// Update targets that did not exist and were created
    pub created: usize,
}

/// Mutates a spec tree according to an overlay
#[derive(Debug, Default, Clone, Copy)]
pub struct OverlayApplier;

impl OverlayApplier {
    pub fn new() -> Self {
        Self
    }

    /// Apply every action of `overlay` to `spec`.
    ///
    /// Bad actions are logged and skipped; the run itself never fails.
    pub fn apply(&self, spec: &mut JsonValue, overlay: &OverlayDocument) -> ApplyStats {
        if !overlay.overlay.starts_with("1.0") {
            log::warn!(
                "Overlay version {} may not be fully supported, applying anyway",
                overlay.overlay
            );
        }
        log::info!(
            "Applying overlay '{}' with {} actions",
            overlay.info.title,
            overlay.actions.len()
        );

        let mut stats = ApplyStats::default();
        for (i, action) in overlay.actions.iter().enumerate() {
            match self.apply_action(spec, action) {
                Ok(Outcome::Applied) => stats.applied += 1,
                Ok(Outcome::Created) => {
                    stats.applied += 1;
                    stats.created += 1;
                }
                Ok(Outcome::Skipped) => stats.skipped += 1,
                Err(e) => {
                    log::error!("Failed to apply action {} ({}): {}", i, action.target, e);
                    stats.skipped += 1;
                }
            }
        }
        log::info!(
            "Applied {} overlay actions ({} created, {} skipped)",
            stats.applied,
            stats.created,
            stats.skipped
        );
        stats
    }

    fn apply_action(&self, spec: &mut JsonValue, action: &OverlayAction) -> crate::Result<Outcome> {
        if action.target.trim().is_empty() {
            log::warn!("Skipping overlay action without a target");
            return Ok(Outcome::Skipped);
        }

        let path = JsonPath::parse(&action.target)?;
        if let Some(value) = &action.update {
            return apply_update(spec, &path, value);
        }
        if action.remove == Some(true) {
            apply_remove(spec, &path);
            return Ok(Outcome::Applied);
        }

        log::warn!(
            "Skipping overlay action for {}: neither update nor remove",
            action.target
        );
        Ok(Outcome::Skipped)
    }
}

enum Outcome {
    Applied,
    Created,
    Skipped,
}

fn apply_update(spec: &mut JsonValue, path: &JsonPath, value: &JsonValue) -> crate::Result<Outcome> {
    let matches = path.find(spec);
    if matches.is_empty() {
        let steps = path.steps().ok_or_else(|| {
            crate::Error::overlay(format!("{} matched nothing and cannot be created", path))
        })?;
        log::debug!("Creating missing target {}", path);
        jsonpath::set_creating(spec, &steps, value.clone())?;
        return Ok(Outcome::Created);
    }

    for steps in matches {
        if let Some(node) = jsonpath::node_mut(spec, &steps) {
            *node = value.clone();
        }
    }
    Ok(Outcome::Applied)
}

fn apply_remove(spec: &mut JsonValue, path: &JsonPath) {
    let mut matches = path.find(spec);
    // Later list indices first so earlier ones stay valid
    matches.sort();
    matches.reverse();
    for steps in matches {
        jsonpath::remove_at(spec, &steps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayInfo;
    use serde_json::json;

    fn overlay(actions: Vec<OverlayAction>) -> OverlayDocument {
        let mut doc = OverlayDocument::new(OverlayInfo {
            title: "test".to_string(),
            version: "1.0.0".to_string(),
            description: None,
        });
        doc.actions = actions;
        doc
    }

    fn spec() -> JsonValue {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/x": {"get": {"summary": "old", "parameters": [
                    {"name": "a", "in": "query"},
                    {"name": "b", "in": "query"},
                    {"name": "c", "in": "query"}
                ]}}
            }
        })
    }

    #[test]
    fn test_update_creates_missing_description() {
        let mut doc = spec();
        let stats = OverlayApplier::new().apply(
            &mut doc,
            &overlay(vec![OverlayAction::update("$.paths['/x'].get.description", "List X")]),
        );
        assert_eq!(doc["paths"]["/x"]["get"]["description"], "List X");
        assert_eq!(stats, ApplyStats { applied: 1, skipped: 0, created: 1 });
    }

    #[test]
    fn test_actions_apply_in_order() {
        let mut doc = spec();
        let stats = OverlayApplier::new().apply(
            &mut doc,
            &overlay(vec![
                OverlayAction::update("$.paths['/x'].get.summary", "first"),
                OverlayAction::update("$.paths['/x'].get.summary", "second"),
                OverlayAction::update("$.paths['/x'].get.parameters[1].description", "B"),
            ]),
        );
        assert_eq!(doc["paths"]["/x"]["get"]["summary"], "second");
        assert_eq!(doc["paths"]["/x"]["get"]["parameters"][1]["description"], "B");
        assert_eq!(stats.applied, 3);
    }

    #[test]
    fn test_remove_multiple_indices() {
        let mut doc = spec();
        OverlayApplier::new().apply(
            &mut doc,
            &overlay(vec![
                OverlayAction::remove("$.paths['/x'].get.parameters[*]"),
                OverlayAction::remove("$.paths['/missing']"),
            ]),
        );
        assert_eq!(doc["paths"]["/x"]["get"]["parameters"], json!([]));
        assert!(doc["paths"].get("/missing").is_none());
    }

    #[test]
    fn test_bad_actions_are_skipped() {
        let mut doc = spec();
        let before = doc.clone();
        let noop = OverlayAction {
            target: "$.paths['/x'].get.summary".to_string(),
            update: None,
            remove: None,
        };
        let stats = OverlayApplier::new().apply(
            &mut doc,
            &overlay(vec![
                OverlayAction::update("", "no target"),
                noop,
                OverlayAction::update("$..summary", "unsupported"),
                OverlayAction::update("$.paths.*.put.summary", "cannot create"),
            ]),
        );
        assert_eq!(doc, before);
        assert_eq!(stats.skipped, 4);
        assert_eq!(stats.applied, 0);
    }

    #[test]
    fn test_application_is_deterministic() {
        let actions = overlay(vec![
            OverlayAction::update("$.paths['/x'].get.description", "d"),
            OverlayAction::update("$.info.title", "t"),
        ]);
        let mut first = spec();
        let mut second = spec();
        OverlayApplier::new().apply(&mut first, &actions);
        OverlayApplier::new().apply(&mut second, &actions);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_version_still_applies() {
        let mut doc = spec();
        let mut actions = overlay(vec![OverlayAction::update("$.info.title", "t")]);
        actions.overlay = "2.0.0".to_string();
        let stats = OverlayApplier::new().apply(&mut doc, &actions);
        assert_eq!(stats.applied, 1);
        assert_eq!(doc["info"]["title"], "t");
    }
}
