//! Visual observation stage: one vision-completion call that turns a scene
//! screenshot plus a query into an observed-state description and a list of
//! recommended low-level mutation calls.

use std::sync::Arc;

use tracing::info;

use crate::error::{AppError, Result};
use crate::llm_gateway::LanguageBackend;
use crate::schema::ObservationResult;

const OBSERVER_SYSTEM_PROMPT: &str = r#"You are the visual observation stage of an AI system that edits 3D scenes.

Your role:
1. Analyze screenshots of the 3D scene editor
2. Identify objects, their properties, and current state
3. Determine what changes need to be made for the query
4. Format mutation calls for the execution stage
5. Validate that previously requested changes were applied

Mutation call shape:
{ "kind": "set_property" | "set_variable" | "emit_event",
  "target": "object, variable or event name",
  "property": "position|rotation|scale|visible (set_property only)",
  "value": <new value>,
  "reasoning": "why this change" }

Respond with ONLY one JSON object of this exact shape:
{
  "observation": "what you see in the screenshot",
  "detected_objects": ["objects visible in the scene"],
  "recommended_mutations": [ <mutation calls, possibly empty> ],
  "validation_points": ["things to check after execution"]
}"#;

pub struct Observer {
    backend: Arc<dyn LanguageBackend>,
}

impl Observer {
    pub fn new(backend: Arc<dyn LanguageBackend>) -> Self {
        Self { backend }
    }

    /// Observe the scene for `query`. The screenshot is supplied by the
    /// caller; the orchestrator captures a fresh one from the live handle
    /// when it has none.
    pub async fn observe(&self, query: &str, screenshot_b64: &str) -> Result<ObservationResult> {
        let raw = self
            .backend
            .complete_vision_json(OBSERVER_SYSTEM_PROMPT, query, screenshot_b64)
            .await?;

        let result: ObservationResult =
            serde_json::from_str(&raw).map_err(|e| AppError::MalformedObservation(e.to_string()))?;
        info!(
            objects = result.detected_objects.len(),
            mutations = result.recommended_mutations.len(),
            "scene observed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_gateway::testing::MockBackend;
    use crate::schema::MutationKind;

    #[tokio::test]
    async fn valid_observation_parses() {
        let backend = Arc::new(MockBackend::new());
        backend.push_vision(
            r##"{
                "observation": "A gray cube centered in the viewport",
                "detected_objects": ["Cube"],
                "recommended_mutations": [
                    { "kind": "set_variable", "target": "cube_color", "value": "#FF0000" }
                ],
                "validation_points": ["Cube should be red"]
            }"##,
        );
        let observer = Observer::new(backend);

        let result = observer.observe("what color is the cube", "aW1n").await.unwrap();
        assert_eq!(result.detected_objects, vec!["Cube"]);
        assert_eq!(result.recommended_mutations.len(), 1);
        assert_eq!(result.recommended_mutations[0].kind, MutationKind::SetVariable);
    }

    #[tokio::test]
    async fn malformed_observation_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        backend.push_vision("I see a cube");
        let observer = Observer::new(backend);

        let err = observer.observe("query", "aW1n").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedObservation(_)));
    }

    #[tokio::test]
    async fn missing_optional_fields_default_to_empty() {
        let backend = Arc::new(MockBackend::new());
        backend.push_vision(r#"{ "observation": "empty scene" }"#);
        let observer = Observer::new(backend);

        let result = observer.observe("query", "aW1n").await.unwrap();
        assert!(result.recommended_mutations.is_empty());
        assert!(result.validation_points.is_empty());
    }
}
