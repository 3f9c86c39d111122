//! Planning stage: turns (command, structured GUI context, retrieved
//! knowledge) into a structured multi-step plan via one text-completion call.
//!
//! The response is untrusted text and is validated against the `Plan` shape
//! before anything acts on it. A response that does not fit fails loudly as
//! `MalformedPlan` — fabricating a fallback plan would mean guessing the
//! user's intent, which is unsafe.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::{AppError, Result};
use crate::llm_gateway::LanguageBackend;
use crate::schema::Plan;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the planning stage of an AI system that edits 3D scenes on behalf of a user.

Your role:
1. Understand the user's intent and break it down into actionable steps
2. Consider the GUI context and knowledge-base context provided
3. Identify which steps need a fresh look at the scene (vision)
4. Plan the sequence of operations

Available mutation verbs the execution stage understands:
- set_property: set position, rotation, scale or visible on a named object
- set_variable: set a named scene variable (colors, material parameters, custom values)
- emit_event: trigger a named scene event (animations, interactions)

Respond with ONLY one JSON object of this exact shape:
{
  "intent": "clear summary of what the user wants",
  "steps": [
    {
      "id": 1,
      "action": "brief description of the step",
      "description": "longer description",
      "requires_vision": true,
      "vision_query": "if requires_vision, what to look for in the screenshot",
      "validation_criteria": "how to verify this step succeeded"
    }
  ],
  "validation": "overall success criteria"
}"#;

pub struct Planner {
    backend: Arc<dyn LanguageBackend>,
}

impl Planner {
    pub fn new(backend: Arc<dyn LanguageBackend>) -> Self {
        Self { backend }
    }

    pub async fn plan(
        &self,
        command: &str,
        gui_context: &Value,
        knowledge_summary: &str,
    ) -> Result<Plan> {
        let user = format!(
            "Command: \"{}\"\n\nKnowledge base context:\n{}\n\nGUI context:\n{}\n\nRaw GUI context data:\n{}",
            command,
            knowledge_summary,
            format_gui_context(gui_context),
            serde_json::to_string_pretty(gui_context).unwrap_or_else(|_| "{}".to_string()),
        );

        let raw = self.backend.complete_json(PLANNER_SYSTEM_PROMPT, &user).await?;
        let plan = parse_plan(&raw)?;
        info!(intent = %plan.intent, steps = plan.steps.len(), "plan generated");
        Ok(plan)
    }
}

/// Schema validation at the boundary: the raw completion text either parses
/// as a whole `Plan` or is rejected.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let plan: Plan =
        serde_json::from_str(raw).map_err(|e| AppError::MalformedPlan(e.to_string()))?;
    if plan.intent.trim().is_empty() {
        return Err(AppError::MalformedPlan("plan has an empty intent".to_string()));
    }
    Ok(plan)
}

/// Renders the structured GUI context (material/object/text/interaction/
/// animation pickers) into a readable block for the planner.
pub fn format_gui_context(context: &Value) -> String {
    let mut parts = Vec::new();

    if let Some(m) = non_empty_section(context, "material") {
        parts.push(format!(
            "Material: {} (transparency: {}, roughness: {}, color: {})",
            str_or(m, "type", "default"),
            num_or(m, "transparency", 0.0),
            num_or(m, "roughness", 0.5),
            str_or(m, "color", "default"),
        ));
    }

    if let Some(o) = non_empty_section(context, "object") {
        parts.push(format!(
            "Object: {} (size: {}x{}x{})",
            str_or(o, "type", "default"),
            str_or(o, "width", "auto"),
            str_or(o, "height", "auto"),
            str_or(o, "depth", "auto"),
        ));
    }

    if let Some(t) = non_empty_section(context, "text") {
        parts.push(format!(
            "Text: \"{}\" (font: {}, size: {})",
            str_or(t, "content", ""),
            str_or(t, "font", "default"),
            str_or(t, "size", "default"),
        ));
    }

    if let Some(i) = non_empty_section(context, "interaction") {
        parts.push(format!(
            "Interaction: {} -> {}",
            str_or(i, "type", "none"),
            str_or(i, "action", "none"),
        ));
    }

    if let Some(a) = non_empty_section(context, "animation") {
        parts.push(format!(
            "Animation: {} (duration: {}s, easing: {})",
            str_or(a, "type", "none"),
            num_or(a, "duration", 0.0),
            str_or(a, "easing", "linear"),
        ));
    }

    if parts.is_empty() {
        "No GUI context provided".to_string()
    } else {
        parts.join("\n")
    }
}

fn non_empty_section<'a>(context: &'a Value, key: &str) -> Option<&'a Value> {
    context
        .get(key)
        .filter(|v| v.as_object().map(|o| !o.is_empty()).unwrap_or(false))
}

fn str_or<'a>(section: &'a Value, key: &str, default: &'a str) -> String {
    match section.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn num_or(section: &Value, key: &str, default: f64) -> f64 {
    section.get(key).and_then(Value::as_f64).unwrap_or(default)
}
