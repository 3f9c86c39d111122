//! Session registry: maps opaque session ids to session records and owns the
//! lifecycle of live scene handles. All registry-mutating operations go
//! through one mutex so two callers can never race two live handles for the
//! same target.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::scene::{AutomationSurface, SceneHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Planning-only; holds no live scene handle.
    #[serde(alias = "extension")]
    Lightweight,
    /// Owns an exclusive live scene handle for its lifetime.
    #[serde(alias = "puppeteer")]
    Full,
}

/// Per-mode payload. A LIGHTWEIGHT session has no handle field at all, so it
/// can never be handed a live-handle operation.
pub enum SessionKind {
    Lightweight,
    Full { handle: Arc<dyn SceneHandle> },
}

pub struct Session {
    pub id: String,
    pub target_ref: String,
    pub created_at: DateTime<Utc>,
    pub kind: SessionKind,
}

impl Session {
    pub fn mode(&self) -> SessionMode {
        match self.kind {
            SessionKind::Lightweight => SessionMode::Lightweight,
            SessionKind::Full { .. } => SessionMode::Full,
        }
    }

    pub fn handle(&self) -> Option<&Arc<dyn SceneHandle>> {
        match &self.kind {
            SessionKind::Lightweight => None,
            SessionKind::Full { handle } => Some(handle),
        }
    }
}

pub struct InitOutcome {
    pub session: Arc<Session>,
    pub reused: bool,
}

/// Minimal session identity persisted to disk so a LIGHTWEIGHT session can be
/// rediscovered after a process restart. Never the handle itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedIdentity {
    session_id: String,
    target_ref: String,
    mode: SessionMode,
}

pub struct SessionRegistry {
    inner: Mutex<HashMap<String, Arc<Session>>>,
    surface: Option<Arc<dyn AutomationSurface>>,
    identity_path: PathBuf,
    ready_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        surface: Option<Arc<dyn AutomationSurface>>,
        storage_dir: &Path,
        ready_timeout: Duration,
    ) -> Self {
        let identity_path = storage_dir.join("sessions.json");
        let restored = Self::restore_lightweight(&identity_path);
        if !restored.is_empty() {
            info!(count = restored.len(), "rediscovered lightweight sessions");
        }

        Self {
            inner: Mutex::new(restored),
            surface,
            identity_path,
            ready_timeout,
        }
    }

    /// Create a session for `target_ref`, or return the open one targeting it
    /// with the same mode (`reused = true`). FULL mode launches the
    /// automation surface and waits for the scene's ready signal.
    pub async fn init(&self, target_ref: &str, mode: SessionMode) -> Result<InitOutcome> {
        let mut map = self.inner.lock().await;

        if let Some(existing) = map
            .values()
            .find(|s| s.target_ref == target_ref && s.mode() == mode)
        {
            return Ok(InitOutcome {
                session: existing.clone(),
                reused: true,
            });
        }

        let kind = match mode {
            SessionMode::Lightweight => SessionKind::Lightweight,
            SessionMode::Full => {
                let surface = self.surface.as_ref().ok_or_else(|| {
                    AppError::ServiceUnavailable(
                        "no automation surface configured for full sessions".to_string(),
                    )
                })?;
                let handle = surface.launch(target_ref).await?;
                // Outer bound in case the handle's own wait never resolves.
                match tokio::time::timeout(
                    self.ready_timeout,
                    handle.wait_for_ready(self.ready_timeout),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        let _ = handle.close().await;
                        return Err(e);
                    }
                    Err(_) => {
                        let _ = handle.close().await;
                        return Err(AppError::SceneLoadTimeout(self.ready_timeout.as_secs()));
                    }
                }
                SessionKind::Full { handle }
            }
        };

        let session = Arc::new(Session {
            id: uuid::Uuid::new_v4().to_string(),
            target_ref: target_ref.to_string(),
            created_at: Utc::now(),
            kind,
        });
        info!(session_id = %session.id, target_ref, ?mode, "session initialized");
        map.insert(session.id.clone(), session.clone());
        self.persist(&map);

        Ok(InitOutcome {
            session,
            reused: false,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.inner
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// First open session, for callers that did not pin one.
    pub async fn first_open(&self) -> Option<Arc<Session>> {
        self.inner.lock().await.values().next().cloned()
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Releases the live handle (FULL mode) and removes the record. Unknown
    /// ids are a no-op, mirroring external cleanup that already happened.
    pub async fn close(&self, id: &str) -> Result<()> {
        let mut map = self.inner.lock().await;
        if let Some(session) = map.remove(id) {
            if let Some(handle) = session.handle() {
                if let Err(e) = handle.close().await {
                    warn!(session_id = %id, error = %e, "failed to release scene handle");
                }
            }
            info!(session_id = %id, "session closed");
            self.persist(&map);
        }
        Ok(())
    }

    /// Shutdown hook: release every open FULL session's handle before exit.
    pub async fn close_all(&self) {
        let mut map = self.inner.lock().await;
        for (id, session) in map.drain() {
            if let Some(handle) = session.handle() {
                if let Err(e) = handle.close().await {
                    warn!(session_id = %id, error = %e, "failed to release scene handle");
                }
            }
        }
        self.persist(&map);
    }

    fn persist(&self, map: &HashMap<String, Arc<Session>>) {
        let identities: Vec<PersistedIdentity> = map
            .values()
            .map(|s| PersistedIdentity {
                session_id: s.id.clone(),
                target_ref: s.target_ref.clone(),
                mode: s.mode(),
            })
            .collect();

        let write = || -> Result<()> {
            if let Some(parent) = self.identity_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&identities)
                .map_err(|e| AppError::Storage(e.to_string()))?;
            fs::write(&self.identity_path, json)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(error = %e, "failed to persist session identities");
        }
    }

    /// Re-register LIGHTWEIGHT identities from a previous run under their
    /// original ids. FULL entries are dropped; a live handle cannot be
    /// rediscovered, only re-launched by a fresh init.
    fn restore_lightweight(path: &Path) -> HashMap<String, Arc<Session>> {
        let mut map = HashMap::new();
        let Ok(raw) = fs::read_to_string(path) else {
            return map;
        };
        let Ok(identities) = serde_json::from_str::<Vec<PersistedIdentity>>(&raw) else {
            warn!(path = %path.display(), "ignoring corrupt session identity file");
            return map;
        };
        for identity in identities {
            if identity.mode == SessionMode::Lightweight {
                let session = Arc::new(Session {
                    id: identity.session_id.clone(),
                    target_ref: identity.target_ref,
                    created_at: Utc::now(),
                    kind: SessionKind::Lightweight,
                });
                map.insert(identity.session_id, session);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::testing::{MockScene, MockSurface};
    use std::sync::atomic::Ordering;

    fn registry(
        surface: Option<Arc<dyn AutomationSurface>>,
        dir: &Path,
    ) -> SessionRegistry {
        SessionRegistry::new(surface, dir, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn same_target_same_mode_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let scene = MockScene::with_objects(&[]);
        let surface = MockSurface::new(scene);
        let registry = registry(Some(surface.clone()), dir.path());

        let first = registry.init("scene-1", SessionMode::Full).await.unwrap();
        let second = registry.init("scene-1", SessionMode::Full).await.unwrap();

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.session.id, second.session.id);
        assert_eq!(surface.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lightweight_init_needs_no_automation_surface() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(None, dir.path());

        let first = registry
            .init("scene-1", SessionMode::Lightweight)
            .await
            .unwrap();
        let second = registry
            .init("scene-1", SessionMode::Lightweight)
            .await
            .unwrap();

        assert!(first.session.handle().is_none());
        assert!(second.reused);
    }

    #[tokio::test]
    async fn full_init_without_surface_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(None, dir.path());

        let err = registry.init("scene-1", SessionMode::Full).await.err().unwrap();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn scene_ready_timeout_surfaces_and_releases_handle() {
        let dir = tempfile::tempdir().unwrap();
        let scene = MockScene::with_objects(&[]);
        scene.never_ready.store(true, Ordering::SeqCst);
        let surface = MockSurface::new(scene.clone());
        let registry = registry(Some(surface), dir.path());

        let err = registry.init("scene-1", SessionMode::Full).await.err().unwrap();
        assert!(matches!(err, AppError::SceneLoadTimeout(_)));
        assert!(scene.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn close_unknown_id_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(None, dir.path());
        registry.close("no-such-session").await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_full_handle() {
        let dir = tempfile::tempdir().unwrap();
        let scene = MockScene::with_objects(&[]);
        let surface = MockSurface::new(scene.clone());
        let registry = registry(Some(surface), dir.path());

        let outcome = registry.init("scene-1", SessionMode::Full).await.unwrap();
        registry.close(&outcome.session.id).await.unwrap();

        assert!(scene.closed.load(Ordering::SeqCst));
        assert!(matches!(
            registry.get(&outcome.session.id).await.err().unwrap(),
            AppError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn lightweight_identity_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let registry = registry(None, dir.path());
            registry
                .init("scene-1", SessionMode::Lightweight)
                .await
                .unwrap()
                .session
                .id
                .clone()
        };

        let reopened = registry(None, dir.path());
        let session = reopened.get(&id).await.unwrap();
        assert_eq!(session.target_ref, "scene-1");
        assert_eq!(session.mode(), SessionMode::Lightweight);
    }

    #[tokio::test]
    async fn close_all_releases_every_handle() {
        let dir = tempfile::tempdir().unwrap();
        let scene = MockScene::with_objects(&[]);
        let surface = MockSurface::new(scene.clone());
        let registry = registry(Some(surface), dir.path());

        registry.init("scene-1", SessionMode::Full).await.unwrap();
        registry
            .init("scene-2", SessionMode::Lightweight)
            .await
            .unwrap();
        registry.close_all().await;

        assert!(scene.closed.load(Ordering::SeqCst));
        assert_eq!(registry.count().await, 0);
    }
}
