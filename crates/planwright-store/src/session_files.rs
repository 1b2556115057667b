use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use planwright_core::ids::SessionId;
use planwright_core::session::Session;

use crate::error::StoreError;
use crate::sessions::SessionRepository;

/// Sessions as one pretty-printed JSON document each, for deployments that
/// keep anonymous sessions outside the database.
///
/// Writes go to `{id}.json.tmp` and are renamed into place, so a reader never
/// sees a half-written record. Mutations are serialized by an in-process lock,
/// which makes the revision check and the write a single step.
pub struct FileSessionRepo {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        if !id.is_path_safe() {
            return Err(StoreError::InvalidInput(format!("unusable session id {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_file(path: &Path) -> Result<Option<Session>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StoreError::Serialization(format!("failed to parse {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("failed to read {}: {e}", path.display()))),
        }
    }

    async fn write_atomic(&self, id: &SessionId, session: &Session) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let final_path = self.path_for(id)?;
        let tmp_path = self.dir.join(format!("{id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(session)?;

        fs::write(&tmp_path, bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(format!("publish {}: {e}", final_path.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepo {
    fn backend(&self) -> &'static str {
        "files"
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&session.id)?;
        if fs::try_exists(&path).await? {
            return Err(StoreError::Conflict(format!("session {} already exists", session.id)));
        }
        self.write_atomic(&session.id, session).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let path = self.path_for(id)?;
        Self::read_file(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: u32) -> Result<Vec<Session>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_file(&path).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session file"),
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn update(&self, session: &Session, expected_revision: u64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(&session.id)?;
        let stored = Self::read_file(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session.id)))?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict(format!(
                "session {} is at revision {}, expected {expected_revision}",
                session.id, stored.revision
            )));
        }
        self.write_atomic(&session.id, session).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use planwright_core::phase::Phase;
    use planwright_core::session::PhaseSubmission;

    #[tokio::test]
    async fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path());
        let s = Session::new("Acme", None, Utc::now()).unwrap();
        repo.insert(&s).await.unwrap();

        assert!(dir.path().join(format!("{}.json", s.id)).exists());
        assert_eq!(repo.get(&s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn list_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path().join("never-created"));
        assert!(repo.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_garbage_and_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path());
        let s = Session::new("Acme", None, Utc::now()).unwrap();
        repo.insert(&s).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("x.json.tmp"), "{}").unwrap();

        let all = repo.list(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, s.id);
    }

    #[tokio::test]
    async fn revision_mismatch_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path());
        let mut s = Session::new("Acme", None, Utc::now()).unwrap();
        repo.insert(&s).await.unwrap();

        s.complete_phase(Phase::Analyst, PhaseSubmission::default(), Utc::now());
        s.revision = 1;
        repo.update(&s, 0).await.unwrap();

        let err = repo.update(&s, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(!dir.path().join(format!("{}.json.tmp", s.id)).exists());
    }

    #[tokio::test]
    async fn unsafe_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path());
        let err = repo.get(&SessionId::from_raw("../escape")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepo::new(dir.path());
        let s = Session::new("Acme", None, Utc::now()).unwrap();
        repo.insert(&s).await.unwrap();
        assert!(repo.delete(&s.id).await.unwrap());
        assert!(!repo.delete(&s.id).await.unwrap());
        assert!(matches!(repo.get(&s.id).await, Err(StoreError::NotFound(_))));
    }
}
