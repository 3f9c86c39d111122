//! Orchestrator: drives one user command through plan -> (observe) ->
//! execute -> validate, decides continue-vs-abort per step, and assembles
//! the execution record. Sole writer of the audit log.
//!
//! Steps run strictly in plan order, one at a time; later steps may depend
//! on scene state set by earlier ones. Closing a session while a command is
//! mid-flight is undefined behavior and documented as a known limitation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::knowledge_store::KnowledgeStore;
use crate::llm_gateway::LanguageBackend;
use crate::observer::Observer;
use crate::planner::Planner;
use crate::retrieval::Enricher;
use crate::scene::SceneHandle;
use crate::schema::{ExecutionRecord, ObservationResult, StepResult};
use crate::session::Session;

pub struct Orchestrator {
    planner: Planner,
    observer: Observer,
    enricher: Enricher,
    settle_delay: Duration,
    audit: Mutex<Vec<ExecutionRecord>>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn LanguageBackend>,
        store: Arc<KnowledgeStore>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            planner: Planner::new(backend.clone()),
            observer: Observer::new(backend),
            enricher: Enricher::new(store),
            settle_delay,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Run one user command against a session. Planning failures surface as
    /// errors to the caller; step-level failures abort the run and are
    /// reported inside the returned record with `success = false`.
    pub async fn run(
        &self,
        command: &str,
        gui_context: &Value,
        session: &Session,
    ) -> Result<ExecutionRecord> {
        info!(command, session_id = %session.id, "orchestrating command");

        let page_hint = gui_context.get("page").and_then(Value::as_str);
        let enriched = self.enricher.enrich(command, page_hint).await;
        let plan = self
            .planner
            .plan(command, gui_context, &enriched.summary)
            .await?;

        let Some(handle) = session.handle() else {
            // Planning-only session: hand the plan back for the presentation
            // layer to execute in-page.
            let record = ExecutionRecord {
                command: command.to_string(),
                context: gui_context.clone(),
                plan,
                step_results: Vec::new(),
                success: true,
                timestamp: Utc::now(),
            };
            self.audit.lock().await.push(record.clone());
            return Ok(record);
        };

        // Initial look at the scene; steps without their own vision query
        // reuse the most recent observation.
        let mut last_observation = match self
            .capture_and_observe(
                handle,
                &format!(
                    "User wants to: {}. What is the current state of the scene?",
                    plan.intent
                ),
            )
            .await
        {
            Ok(observation) => observation,
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => {
                warn!(error = %e, "initial observation failed, starting without scene context");
                ObservationResult::default()
            }
        };

        let mut step_results: Vec<StepResult> = Vec::new();
        let mut aborted = false;

        for step in &plan.steps {
            info!(step_id = step.id, action = %step.action, "executing step");

            let observation = if step.requires_vision {
                let query = step
                    .vision_query
                    .clone()
                    .unwrap_or_else(|| step.action.clone());
                match self.capture_and_observe(handle, &query).await {
                    Ok(observation) => {
                        last_observation = observation.clone();
                        observation
                    }
                    Err(e) if e.is_session_expired() => return Err(e),
                    Err(e) => {
                        warn!(step_id = step.id, error = %e, "step observation failed");
                        step_results.push(StepResult {
                            step: step.clone(),
                            observation: None,
                            mutation_outcomes: Vec::new(),
                            validation: None,
                            success: false,
                        });
                        aborted = true;
                        break;
                    }
                }
            } else {
                last_observation.clone()
            };

            let mutations = &observation.recommended_mutations;
            let outcomes = crate::executor::apply(handle, mutations).await?;
            let successful = outcomes.iter().filter(|o| o.success).count();

            // Let the scene settle before judging the result.
            tokio::time::sleep(self.settle_delay).await;
            let criteria = step
                .validation_criteria
                .clone()
                .unwrap_or_else(|| plan.validation.clone());
            let validation = match self
                .capture_and_observe(
                    handle,
                    &format!("Verify that step {} was successful: {}", step.id, criteria),
                )
                .await
            {
                Ok(observation) => Some(observation),
                Err(e) if e.is_session_expired() => return Err(e),
                Err(e) => {
                    warn!(step_id = step.id, error = %e, "validation observation failed");
                    None
                }
            };

            // An empty recommendation list means there was nothing to change;
            // that is a no-op success, not a failure.
            let step_ok = mutations.is_empty() || successful > 0;
            step_results.push(StepResult {
                step: step.clone(),
                observation: Some(observation),
                mutation_outcomes: outcomes,
                validation,
                success: step_ok,
            });

            if !step_ok {
                warn!(step_id = step.id, "step had no successful mutation, aborting run");
                aborted = true;
                break;
            }
        }

        let success = !aborted && step_results.iter().all(|r| r.success);
        info!(
            success,
            steps_attempted = step_results.len(),
            steps_planned = plan.steps.len(),
            "command finished"
        );

        let record = ExecutionRecord {
            command: command.to_string(),
            context: gui_context.clone(),
            plan,
            step_results,
            success,
            timestamp: Utc::now(),
        };
        self.audit.lock().await.push(record.clone());
        Ok(record)
    }

    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.audit.lock().await.clone()
    }

    async fn capture_and_observe(
        &self,
        handle: &Arc<dyn SceneHandle>,
        query: &str,
    ) -> Result<ObservationResult> {
        let screenshot = handle.screenshot().await?;
        self.observer.observe(query, &screenshot).await
    }
}
