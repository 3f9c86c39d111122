//! Retrieval enricher: augments a raw user command with knowledge-store
//! context before planning. Strictly best-effort; a dead embedding service
//! degrades to empty result sets, never to a failed command.

use std::sync::Arc;

use tracing::warn;

use crate::knowledge_store::{Collection, KnowledgeStore, SearchHit};

/// Substring matches (case-insensitive) that indicate visual/material intent
/// and justify the extra material-collection search.
const MATERIAL_KEYWORDS: [&str; 7] = [
    "material",
    "color",
    "glass",
    "metal",
    "texture",
    "appearance",
    "style",
];

const NO_CONTEXT: &str = "No relevant context found in knowledge base.";

pub struct EnrichedContext {
    pub ui_patterns: Vec<SearchHit>,
    pub materials: Vec<SearchHit>,
    pub summary: String,
}

pub struct Enricher {
    store: Arc<KnowledgeStore>,
}

impl Enricher {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    pub async fn enrich(&self, command: &str, page_hint: Option<&str>) -> EnrichedContext {
        let ui_patterns = match self
            .store
            .search(
                Collection::UiPatterns,
                command,
                3,
                page_hint.map(|p| ("page", p)),
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "UI pattern retrieval failed, degrading to empty context");
                Vec::new()
            }
        };

        let materials = if has_material_intent(command) {
            match self.store.search(Collection::Materials, command, 2, None).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "material retrieval failed, degrading to empty context");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let summary = summarize(&ui_patterns, &materials);
        EnrichedContext {
            ui_patterns,
            materials,
            summary,
        }
    }
}

fn has_material_intent(command: &str) -> bool {
    let lower = command.to_lowercase();
    MATERIAL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Deterministic summary for the planner: UI patterns first, then materials.
fn summarize(ui_patterns: &[SearchHit], materials: &[SearchHit]) -> String {
    let mut parts = Vec::new();

    if !ui_patterns.is_empty() {
        parts.push("UI Patterns:".to_string());
        for (i, hit) in ui_patterns.iter().enumerate() {
            let selector = hit.tags.get("selector").map(String::as_str).unwrap_or("-");
            parts.push(format!("  {}. {} (selector: {})", i + 1, hit.text, selector));
        }
    }

    if !materials.is_empty() {
        if !parts.is_empty() {
            parts.push(String::new());
        }
        parts.push("Saved Materials:".to_string());
        for (i, hit) in materials.iter().enumerate() {
            let name = hit.tags.get("name").map(String::as_str).unwrap_or(&hit.id);
            let kind = hit.tags.get("type").map(String::as_str).unwrap_or("unknown");
            let color = hit.tags.get("color").map(String::as_str).unwrap_or("default");
            parts.push(format!(
                "  {}. {}: {} material (color: {})",
                i + 1,
                name,
                kind,
                color
            ));
        }
    }

    if parts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        parts.join("\n")
    }
}
