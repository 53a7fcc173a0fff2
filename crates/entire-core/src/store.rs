//! Crash-safe persistence for live session state: one JSON file per
//! session under the repository's Git common directory, written with a
//! temp-file-then-rename so a crash mid-write never leaves a corrupted
//! file in place (state survives a crash between any
//! two hook invocations).

use std::path::Path;

use entire_paths::{EntirePaths, SessionId};

use crate::errors::{CoreError, CoreResult};
use crate::session::Session;

pub struct SessionStore {
    paths: EntirePaths,
}

impl SessionStore {
    pub fn new(paths: EntirePaths) -> Self {
        Self { paths }
    }

    fn ensure_sessions_dir(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.paths.sessions_dir()).map_err(|e| CoreError::StateStoreIo {
            message: format!("failed to create sessions directory: {e}"),
        })
    }

    /// Write `session` to its file atomically: serialize, write to a
    /// sibling temp file, then rename over the target.
    pub fn save(&self, session: &Session) -> CoreResult<()> {
        self.ensure_sessions_dir()?;
        let target = self.paths.session_file(&session.id)?;
        let temp = target.with_extension("json.tmp");

        let serialized = serde_json::to_vec_pretty(session).map_err(|e| CoreError::StateStoreIo {
            message: format!("failed to serialize session: {e}"),
        })?;

        if let Err(e) = std::fs::write(&temp, &serialized) {
            let _ = std::fs::remove_file(&temp);
            return Err(CoreError::StateStoreIo {
                message: format!("failed to write temp session file: {e}"),
            });
        }

        std::fs::rename(&temp, &target).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            CoreError::StateStoreIo {
                message: format!("failed to install session file: {e}"),
            }
        })
    }

    pub fn load(&self, id: &SessionId) -> CoreResult<Option<Session>> {
        let path = self.paths.session_file(id)?;
        load_session_file(&path)
    }

    pub fn remove(&self, id: &SessionId) -> CoreResult<()> {
        let path = self.paths.session_file(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::StateStoreIo {
                message: format!("failed to remove session file: {e}"),
            }),
        }
    }

    /// List every session whose state file parses successfully.
    /// Corrupted files are skipped and logged rather than failing the
    /// whole listing, since one bad file must never block every other
    /// live session from loading.
    pub fn list(&self) -> CoreResult<Vec<Session>> {
        let dir = self.paths.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| CoreError::StateStoreIo {
            message: format!("failed to read sessions directory: {e}"),
        })?;

        let mut sessions = Vec::new();
        let mut skipped = 0u32;
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::StateStoreIo {
                message: format!("failed to read directory entry: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_session_file(&path) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        event = "core.store.skip_corrupted_session",
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable session file"
                    );
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(
                event = "core.store.list_completed_with_skips",
                skipped,
                "some session files could not be loaded"
            );
        }
        Ok(sessions)
    }
}

fn load_session_file(path: &Path) -> CoreResult<Option<Session>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CoreError::StateStoreIo {
                message: format!("failed to read {}: {e}", path.display()),
            })
        }
    };
    let session = serde_json::from_slice(&bytes).map_err(|e| CoreError::StateStoreIo {
        message: format!("failed to parse {}: {e}", path.display()),
    })?;
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let paths = EntirePaths::from_git_common_dir(dir.path());
        (dir, SessionStore::new(paths))
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = store();
        let session = Session::new_for_test("s1");
        store.save(&session).unwrap();

        let loaded = store.load(&session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.base_commit, session.base_commit);
    }

    #[test]
    fn load_missing_session_returns_none() {
        let (_dir, store) = store();
        let id = SessionId::from_raw_agent_id("nope", NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, store) = store();
        let session = Session::new_for_test("s1");
        store.save(&session).unwrap();
        store.remove(&session.id).unwrap();
        store.remove(&session.id).unwrap();
        assert!(store.load(&session.id).unwrap().is_none());
    }

    #[test]
    fn list_skips_corrupted_files_but_returns_the_rest() {
        let (dir, store) = store();
        let session = Session::new_for_test("good");
        store.save(&session).unwrap();

        std::fs::create_dir_all(dir.path().join("entire").join("sessions")).unwrap();
        std::fs::write(
            dir.path().join("entire/sessions/broken.json"),
            b"{not valid json",
        )
        .unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
    }

    #[test]
    fn list_on_missing_directory_returns_empty() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }
}
