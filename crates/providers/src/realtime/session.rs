//! Captured browser session for the real-time backend.
//!
//! The session is produced outside ironloop (by a real browser) and stored as
//! TOML. Every successful bootstrap refreshes the cookie and rewrites the file
//! so the next run starts from the freshest state.

use ironloop_core::ChatError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Browser identity replayed on bootstrap and socket upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    /// TLS fingerprint of the capturing browser
    #[serde(default)]
    pub ja3: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub sec_ms_gec: String,
    #[serde(default)]
    pub sec_ms_gec_version: String,
    #[serde(default)]
    pub x_client_data: String,
    #[serde(default)]
    pub x_ms_user_agent: String,
}

impl Session {
    pub fn has_cookie(&self) -> bool {
        !self.cookie.trim().is_empty()
    }
}

/// A session shared by every chat of one client, persisted under a lock.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    session: Arc<Mutex<Session>>,
}

impl SessionStore {
    /// Load the session file. A missing file yields an empty session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let path = path.into();
        let session = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                ChatError::Session(format!("couldn't read {}: {e}", path.display()))
            })?;
            toml::from_str(&content).map_err(|e| {
                ChatError::Session(format!("couldn't parse {}: {e}", path.display()))
            })?
        } else {
            warn!(path = %path.display(), "Session file not found, starting without cookies");
            Session::default()
        };
        Ok(Self::with_session(path, session))
    }

    pub fn with_session(path: impl Into<PathBuf>, session: Session) -> Self {
        Self {
            path: path.into(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current session.
    pub fn snapshot(&self) -> Result<Session, ChatError> {
        self.session
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ChatError::Session("session lock poisoned".into()))
    }

    /// Store a refreshed cookie and persist the session.
    pub fn update_cookie(&self, cookie: impl Into<String>) -> Result<(), ChatError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ChatError::Session("session lock poisoned".into()))?;
        session.cookie = cookie.into();

        let data = toml::to_string_pretty(&*session)
            .map_err(|e| ChatError::Session(format!("couldn't serialize session: {e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::Session(format!("couldn't create {}: {e}", parent.display())))?;
        }
        std::fs::write(&self.path, data).map_err(|e| {
            ChatError::Session(format!("couldn't write {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "Session persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_file_uses_kebab_case_keys() {
        let session = Session {
            user_agent: "Mozilla/5.0".into(),
            sec_ms_gec_version: "1-112".into(),
            ..Session::default()
        };
        let toml_str = toml::to_string_pretty(&session).unwrap();
        assert!(toml_str.contains("user-agent = \"Mozilla/5.0\""));
        assert!(toml_str.contains("sec-ms-gec-version"));
    }

    #[test]
    fn missing_file_gives_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("absent.toml")).unwrap();
        assert!(!store.snapshot().unwrap().has_cookie());
    }

    #[test]
    fn cookie_update_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "user-agent = \"agent\"\ncookie = \"old=1\"\n").unwrap();

        let store = SessionStore::open(&path).unwrap();
        assert_eq!(store.snapshot().unwrap().user_agent, "agent");

        store.update_cookie("fresh=2; other=3").unwrap();
        let reloaded = SessionStore::open(&path).unwrap().snapshot().unwrap();
        assert_eq!(reloaded.cookie, "fresh=2; other=3");
        assert_eq!(reloaded.user_agent, "agent");
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "cookie = [").unwrap();
        assert!(matches!(SessionStore::open(&path), Err(ChatError::Session(_))));
    }
}
