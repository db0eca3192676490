use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
};

use crate::{
    foundation::{
        core::{SurfaceId, unix_millis},
        error::{TilecastError, TilecastResult},
    },
    playback::session::{PlaybackSession, SessionStatus},
};

/// Registry key: `<media name>_<creation millis>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh id for media `name`, stamped with the current time.
    pub fn generate(name: &str) -> Self {
        Self(format!("{name}_{}", unix_millis()))
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}_{n}", self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Every live playback session, keyed by [`SessionId`].
///
/// Sessions are stopped outside the registry lock so a slow sink never
/// blocks lookups.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, PlaybackSession>>,
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static SessionRegistry {
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, PlaybackSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `session` under `id`. Fails if the id is taken.
    pub fn register(&self, id: SessionId, session: PlaybackSession) -> TilecastResult<()> {
        let mut map = self.lock();
        if map.contains_key(&id) {
            return Err(TilecastError::validation(format!(
                "session id {id} already registered"
            )));
        }
        tracing::debug!(session = %id, "registered session");
        map.insert(id, session);
        Ok(())
    }

    /// Insert `session` under `base`, or `base_1`, `base_2`, ... if taken.
    pub fn register_unique(&self, base: SessionId, session: PlaybackSession) -> SessionId {
        let mut map = self.lock();
        let mut id = base.clone();
        let mut n = 1;
        while map.contains_key(&id) {
            id = base.with_suffix(n);
            n += 1;
        }
        tracing::debug!(session = %id, "registered session");
        map.insert(id.clone(), session);
        id
    }

    /// Remove without stopping.
    pub fn unregister(&self, id: &SessionId) -> Option<PlaybackSession> {
        self.lock().remove(id)
    }

    /// The session registered under `id`.
    pub fn get(&self, id: &SessionId) -> Option<PlaybackSession> {
        self.lock().get(id).cloned()
    }

    /// Remove and stop one session. Returns whether it existed.
    pub fn stop(&self, id: &SessionId) -> bool {
        let Some(session) = self.unregister(id) else {
            return false;
        };
        session.retire();
        true
    }

    /// Stop and remove every session. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let n = drained.len();
        for (id, session) in drained {
            tracing::debug!(session = %id, "stopping");
            session.retire();
        }
        if n > 0 {
            tracing::info!(count = n, "stopped all sessions");
        }
        n
    }

    /// Session whose grid contains `surface`.
    pub fn session_for_surface(&self, surface: SurfaceId) -> Option<(SessionId, PlaybackSession)> {
        self.lock()
            .iter()
            .find(|(_, s)| s.occupies(surface))
            .map(|(id, s)| (id.clone(), s.clone()))
    }

    /// Host notification that `surface` no longer exists.
    ///
    /// The session showing on it is stopped and removed, freeing the rest
    /// of its grid. Returns the id of the session that was stopped.
    pub fn surface_destroyed(&self, surface: SurfaceId) -> Option<SessionId> {
        let (id, session) = {
            let mut map = self.lock();
            let id = map
                .iter()
                .find(|(_, s)| s.occupies(surface))
                .map(|(id, _)| id.clone())?;
            let session = map.remove(&id)?;
            (id, session)
        };
        tracing::info!(session = %id, %surface, "surface destroyed; stopping session");
        session.retire();
        Some(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Status of every session, sorted by id.
    pub fn statuses(&self) -> Vec<(SessionId, SessionStatus)> {
        let sessions: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        let mut out: Vec<_> = sessions
            .into_iter()
            .map(|(id, s)| (id, s.status()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/registry.rs"]
mod tests;
