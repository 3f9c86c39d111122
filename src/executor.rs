//! Execution stage: applies a batch of mutation calls against the live scene
//! handle, strictly one at a time (mutations may depend on scene state set by
//! earlier ones). One failing call never aborts its siblings; whether the
//! overall step sequence continues is the orchestrator's decision. The single
//! exception is a session-expiry signal from the remote, which short-circuits
//! the batch so the boundary above can run its one retry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::scene::{PropertyValue, SceneHandle, SceneProperty};
use crate::schema::{MutationCall, MutationKind, MutationOutcome};

const INTER_CALL_DELAY: Duration = Duration::from_millis(100);

pub async fn apply(
    handle: &Arc<dyn SceneHandle>,
    mutations: &[MutationCall],
) -> Result<Vec<MutationOutcome>> {
    let mut outcomes = Vec::with_capacity(mutations.len());

    for (i, call) in mutations.iter().enumerate() {
        let outcome = match apply_one(handle, call).await {
            Ok(()) => MutationOutcome::ok(),
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => {
                debug!(index = i, error = %e, "mutation call failed");
                MutationOutcome::failed(e.to_string())
            }
        };
        outcomes.push(outcome);

        if i + 1 < mutations.len() {
            tokio::time::sleep(INTER_CALL_DELAY).await;
        }
    }

    Ok(outcomes)
}

async fn apply_one(handle: &Arc<dyn SceneHandle>, call: &MutationCall) -> Result<()> {
    match call.kind {
        MutationKind::SetProperty => {
            let target = call
                .target
                .as_deref()
                .ok_or_else(|| AppError::Execution("set_property requires a target".into()))?;
            let property_name = call
                .property
                .as_deref()
                .ok_or_else(|| AppError::Execution("set_property requires a property".into()))?;
            let property = SceneProperty::parse(property_name).ok_or_else(|| {
                AppError::Execution(format!("cannot set property: {}", property_name))
            })?;

            if !handle.find_by_name(target).await? {
                return Err(AppError::TargetNotFound(target.to_string()));
            }

            let value = coerce_value(property, &call.value)?;
            handle.set_property(target, property, value).await
        }
        MutationKind::SetVariable => {
            let name = call
                .target
                .clone()
                .or_else(|| call.property.clone())
                .ok_or_else(|| AppError::Execution("set_variable requires a name".into()))?;
            handle.set_variable(&name, &call.value).await
        }
        MutationKind::EmitEvent => {
            let event = call
                .target
                .as_deref()
                .ok_or_else(|| AppError::Execution("emit_event requires an event name".into()))?;
            handle.emit_event(event, &call.value).await
        }
    }
}

/// Type coercion for property values: triples accepted as `{x,y,z}` objects,
/// `[x,y,z]` arrays or comma-joined strings; `scale` additionally accepts a
/// lone scalar applied uniformly; `visible` is coerced to a boolean.
pub fn coerce_value(property: SceneProperty, value: &Value) -> Result<PropertyValue> {
    match property {
        SceneProperty::Visible => coerce_flag(value).map(PropertyValue::Flag),
        SceneProperty::Scale => {
            if let Some(scalar) = value.as_f64() {
                let s = scalar as f32;
                return Ok(PropertyValue::Triple { x: s, y: s, z: s });
            }
            coerce_triple(value, 1.0)
        }
        SceneProperty::Position | SceneProperty::Rotation => coerce_triple(value, 0.0),
    }
}

fn coerce_triple(value: &Value, default: f32) -> Result<PropertyValue> {
    match value {
        Value::Object(map) => {
            let component = |key: &str| {
                map.get(key)
                    .and_then(Value::as_f64)
                    .map(|v| v as f32)
                    .unwrap_or(default)
            };
            Ok(PropertyValue::Triple {
                x: component("x"),
                y: component("y"),
                z: component("z"),
            })
        }
        Value::Array(items) => {
            let component = |i: usize| {
                items
                    .get(i)
                    .and_then(Value::as_f64)
                    .map(|v| v as f32)
                    .unwrap_or(default)
            };
            Ok(PropertyValue::Triple {
                x: component(0),
                y: component(1),
                z: component(2),
            })
        }
        Value::String(s) => {
            let parsed: Vec<f32> = s
                .split(',')
                .map(|p| p.trim().parse::<f32>().unwrap_or(default))
                .collect();
            let component = |i: usize| parsed.get(i).copied().unwrap_or(default);
            Ok(PropertyValue::Triple {
                x: component(0),
                y: component(1),
                z: component(2),
            })
        }
        other => Err(AppError::Execution(format!(
            "cannot coerce {} into a numeric triple",
            other
        ))),
    }
}

fn coerce_flag(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(AppError::Execution(format!(
                "cannot coerce \"{}\" into a boolean",
                other
            ))),
        },
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        other => Err(AppError::Execution(format!(
            "cannot coerce {} into a boolean",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::testing::MockScene;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn set_property(target: &str, property: &str, value: Value) -> MutationCall {
        MutationCall {
            kind: MutationKind::SetProperty,
            target: Some(target.to_string()),
            property: Some(property.to_string()),
            value,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn failing_call_does_not_abort_the_batch() {
        let scene = MockScene::with_objects(&["Cube"]);
        let handle: Arc<dyn SceneHandle> = scene.clone();

        let outcomes = apply(
            &handle,
            &[
                set_property("Ghost", "position", json!({"x": 1, "y": 2, "z": 3})),
                set_property("Cube", "position", json!({"x": 1, "y": 2, "z": 3})),
            ],
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("Ghost"));
        assert!(outcomes[1].success);
        assert_eq!(scene.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn session_expiry_short_circuits_the_batch() {
        let scene = MockScene::with_objects(&["Cube"]);
        scene.expired.store(true, Ordering::SeqCst);
        let handle: Arc<dyn SceneHandle> = scene;

        let err = apply(
            &handle,
            &[set_property("Cube", "visible", json!(true))],
        )
        .await
        .unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn set_variable_and_emit_event_reach_the_handle() {
        let scene = MockScene::with_objects(&[]);
        let handle: Arc<dyn SceneHandle> = scene.clone();

        let outcomes = apply(
            &handle,
            &[
                MutationCall {
                    kind: MutationKind::SetVariable,
                    target: Some("cube_color".into()),
                    property: None,
                    value: json!("#FF0000"),
                    reasoning: None,
                },
                MutationCall {
                    kind: MutationKind::EmitEvent,
                    target: Some("spin".into()),
                    property: None,
                    value: json!({"speed": 2}),
                    reasoning: None,
                },
            ],
        )
        .await
        .unwrap();

        assert!(outcomes.iter().all(|o| o.success));
        let calls = scene.calls.lock().unwrap();
        assert!(calls[0].starts_with("set_variable cube_color"));
        assert!(calls[1].starts_with("emit_event spin"));
    }

    #[test]
    fn triples_coerce_from_object_array_and_string() {
        let expected = PropertyValue::Triple { x: 1.0, y: 2.0, z: 3.0 };
        for value in [json!({"x": 1, "y": 2, "z": 3}), json!([1, 2, 3]), json!("1, 2, 3")] {
            assert_eq!(coerce_value(SceneProperty::Position, &value).unwrap(), expected);
        }
    }

    #[test]
    fn scale_accepts_uniform_scalar_and_defaults_to_one() {
        assert_eq!(
            coerce_value(SceneProperty::Scale, &json!(2.5)).unwrap(),
            PropertyValue::Triple { x: 2.5, y: 2.5, z: 2.5 }
        );
        assert_eq!(
            coerce_value(SceneProperty::Scale, &json!({"x": 2.0})).unwrap(),
            PropertyValue::Triple { x: 2.0, y: 1.0, z: 1.0 }
        );
    }

    #[test]
    fn position_missing_components_default_to_zero() {
        assert_eq!(
            coerce_value(SceneProperty::Position, &json!({"y": 4.0})).unwrap(),
            PropertyValue::Triple { x: 0.0, y: 4.0, z: 0.0 }
        );
    }

    #[test]
    fn visible_coerces_from_bool_string_and_number() {
        assert_eq!(
            coerce_value(SceneProperty::Visible, &json!(true)).unwrap(),
            PropertyValue::Flag(true)
        );
        assert_eq!(
            coerce_value(SceneProperty::Visible, &json!("false")).unwrap(),
            PropertyValue::Flag(false)
        );
        assert_eq!(
            coerce_value(SceneProperty::Visible, &json!(1)).unwrap(),
            PropertyValue::Flag(true)
        );
        assert!(coerce_value(SceneProperty::Visible, &json!(["x"])).is_err());
    }

    #[tokio::test]
    async fn unknown_property_fails_that_call_only() {
        let scene = MockScene::with_objects(&["Cube"]);
        let handle: Arc<dyn SceneHandle> = scene;

        let outcomes = apply(
            &handle,
            &[set_property("Cube", "opacity", json!(0.5))],
        )
        .await
        .unwrap();
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("opacity"));
    }
}
