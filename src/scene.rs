//! Contracts for the live scene handle owned by the browser-automation
//! collaborator. The execution and observation stages only touch the scene
//! through these traits, and only via the owning session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// The fixed set of object properties a mutation may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneProperty {
    Position,
    Rotation,
    Scale,
    Visible,
}

impl SceneProperty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "position" => Some(SceneProperty::Position),
            "rotation" => Some(SceneProperty::Rotation),
            "scale" => Some(SceneProperty::Scale),
            "visible" => Some(SceneProperty::Visible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneProperty::Position => "position",
            SceneProperty::Rotation => "rotation",
            SceneProperty::Scale => "scale",
            SceneProperty::Visible => "visible",
        }
    }
}

/// A property value after coercion: numeric triple for transforms, flag for
/// visibility.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Triple { x: f32, y: f32, z: f32 },
    Flag(bool),
}

/// Handle to one live scene. Exclusively owned by a FULL session for its
/// lifetime; released on session close.
#[async_trait]
pub trait SceneHandle: Send + Sync {
    /// Whether an object with this name exists in the scene.
    async fn find_by_name(&self, name: &str) -> Result<bool>;

    async fn set_property(
        &self,
        target: &str,
        property: SceneProperty,
        value: PropertyValue,
    ) -> Result<()>;

    /// Sets a named scene variable, creating it when absent.
    async fn set_variable(&self, name: &str, value: &Value) -> Result<()>;

    /// Fires a named event with an optional payload. Fire-and-forget.
    async fn emit_event(&self, event: &str, payload: &Value) -> Result<()>;

    /// Current scene screenshot as a base64-encoded image.
    async fn screenshot(&self) -> Result<String>;

    /// Resolves once the scene signals readiness, or errors past `timeout`.
    async fn wait_for_ready(&self, timeout: Duration) -> Result<()>;

    /// Releases the underlying automation resources.
    async fn close(&self) -> Result<()>;
}

/// Launches live scene handles. Implemented by the browser-automation
/// collaborator; absent in planning-only deployments.
#[async_trait]
pub trait AutomationSurface: Send + Sync {
    async fn launch(&self, target_ref: &str) -> Result<Arc<dyn SceneHandle>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory scene for tests: a set of known object names, a call log,
    /// and switches for simulated failures.
    #[derive(Default)]
    pub struct MockScene {
        pub objects: Mutex<HashSet<String>>,
        pub calls: Mutex<Vec<String>>,
        pub closed: AtomicBool,
        pub never_ready: AtomicBool,
        pub expired: AtomicBool,
    }

    impl MockScene {
        pub fn with_objects(names: &[&str]) -> Arc<Self> {
            let scene = Self::default();
            {
                let mut objects = scene.objects.lock().unwrap();
                for name in names {
                    objects.insert(name.to_string());
                }
            }
            Arc::new(scene)
        }

        pub fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn check_expired(&self) -> Result<()> {
            if self.expired.load(Ordering::SeqCst) {
                Err(AppError::SessionNotFound("session expired".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SceneHandle for MockScene {
        async fn find_by_name(&self, name: &str) -> Result<bool> {
            self.check_expired()?;
            Ok(self.objects.lock().unwrap().contains(name))
        }

        async fn set_property(
            &self,
            target: &str,
            property: SceneProperty,
            value: PropertyValue,
        ) -> Result<()> {
            self.check_expired()?;
            self.log(format!("set_property {} {} {:?}", target, property.as_str(), value));
            Ok(())
        }

        async fn set_variable(&self, name: &str, value: &Value) -> Result<()> {
            self.check_expired()?;
            self.log(format!("set_variable {} {}", name, value));
            Ok(())
        }

        async fn emit_event(&self, event: &str, payload: &Value) -> Result<()> {
            self.check_expired()?;
            self.log(format!("emit_event {} {}", event, payload));
            Ok(())
        }

        async fn screenshot(&self) -> Result<String> {
            self.check_expired()?;
            self.log("screenshot");
            Ok("bW9jay1zY3JlZW5zaG90".to_string())
        }

        async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
            if self.never_ready.load(Ordering::SeqCst) {
                tokio::time::sleep(timeout + Duration::from_secs(5)).await;
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Surface that hands out a prepared scene handle and counts launches.
    pub struct MockSurface {
        pub scene: Arc<MockScene>,
        pub launches: AtomicUsize,
    }

    impl MockSurface {
        pub fn new(scene: Arc<MockScene>) -> Arc<Self> {
            Arc::new(Self {
                scene,
                launches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AutomationSurface for MockSurface {
        async fn launch(&self, _target_ref: &str) -> Result<Arc<dyn SceneHandle>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(self.scene.clone())
        }
    }
}
