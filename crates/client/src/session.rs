//! Persisted auth slice.
//!
//! Only the token and who it belongs to survive a restart; lists, filters
//! and cached queries never touch disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetops_core::{SiteId, UserId};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub site_id: Option<SiteId>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == fleetops_auth::Role::ADMIN)
    }

    pub fn actor(&self) -> fleetops_core::Actor {
        fleetops_core::Actor {
            user_id: self.user_id,
            site_id: self.site_id,
            admin: self.is_admin(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nobody is signed in.
    pub fn load(&self) -> Result<Option<Session>, SessionError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(session)?;
        std::fs::write(&self.path, raw)?;
        tracing::debug!(path = %self.path.display(), user_id = %session.user_id, "session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        let dir = std::env::temp_dir().join(format!("fleetops-session-{}", UserId::new()));
        SessionStore::new(dir.join("session.json"))
    }

    #[test]
    fn round_trip_and_clear() {
        let store = store();
        assert_eq!(store.load().unwrap(), None);

        let session = Session {
            token: "abc".into(),
            user_id: UserId::new(),
            name: "Nimal".into(),
            site_id: Some(SiteId::new()),
            roles: vec!["site_user".into()],
        };
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session.clone()));
        assert!(!session.actor().admin);

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let store = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(store.load(), Err(SessionError::Corrupt(_))));
    }
}
