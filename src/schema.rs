//! Wire-level data model shared by the pipeline stages.
//!
//! Everything here crosses an untrusted boundary (completion-service JSON or
//! the HTTP API), so it is all plain serde data. Responses are validated
//! against these shapes before any stage acts on them; a response that does
//! not fit is rejected rather than partially trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One atomic scene-state change request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    SetProperty,
    SetVariable,
    EmitEvent,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MutationCall {
    pub kind: MutationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One step of a plan. Ordering within `Plan::steps` is the execution order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Step {
    pub id: u32,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_vision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Map<String, Value>>,
}

/// Structured multi-step intent produced by the planning stage.
/// Immutable once parsed; consumed step by step by the orchestrator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Plan {
    pub intent: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub validation: String,
}

/// Structured description of current scene state plus recommended mutations,
/// produced by the visual observation stage.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ObservationResult {
    pub observation: String,
    #[serde(default)]
    pub detected_objects: Vec<String>,
    #[serde(default)]
    pub recommended_mutations: Vec<MutationCall>,
    #[serde(default)]
    pub validation_points: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationOutcome {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepResult {
    pub step: Step,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<ObservationResult>,
    pub mutation_outcomes: Vec<MutationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ObservationResult>,
    pub success: bool,
}

/// Append-only audit entry for one user command. The orchestrator is the
/// sole writer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionRecord {
    pub command: String,
    pub context: Value,
    pub plan: Plan,
    pub step_results: Vec<StepResult>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}
