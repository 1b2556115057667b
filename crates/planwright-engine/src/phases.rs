use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use planwright_core::checklist::ChecklistResult;
use planwright_core::ids::SessionId;
use planwright_core::phase::{Phase, WorkflowState};
use planwright_core::session::{PhaseSubmission, Session, SessionStatus, SessionSummary};
use planwright_store::{DocumentStore, SessionRepository};

use crate::error::EngineError;
use crate::library::AssetLibrary;

/// Result of finalizing a phase.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCompletion {
    pub session: Session,
    pub next_phase: WorkflowState,
    pub progress: u8,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub progress: u8,
    pub completed_phases: Vec<Phase>,
    pub current_phase: WorkflowState,
}

/// Owner of session state. Every mutation goes through here: it is
/// serialized per session id, checked against the caller's revision if one
/// was supplied, and persisted with the revision bumped by one.
pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
    documents: DocumentStore,
    library: AssetLibrary,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>, documents: DocumentStore, library: AssetLibrary) -> Self {
        Self {
            repo,
            documents,
            library,
            locks: DashMap::new(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.repo.backend()
    }

    fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Load, apply `f`, and write back if `f` reports a change.
    async fn mutate<F>(&self, id: &SessionId, expected_revision: Option<u64>, f: F) -> Result<Session, EngineError>
    where
        F: FnOnce(&mut Session) -> Result<bool, EngineError>,
    {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut session = self.repo.get(id).await?;
        let stored_revision = session.revision;
        if let Some(expected) = expected_revision {
            if expected != stored_revision {
                warn!(session_id = %id, expected, stored_revision, "stale session write rejected");
                return Err(EngineError::Conflict(format!(
                    "session {id} is at revision {stored_revision}, expected {expected}"
                )));
            }
        }

        if !f(&mut session)? {
            return Ok(session);
        }
        session.revision = stored_revision + 1;
        self.repo.update(&session, stored_revision).await?;
        Ok(session)
    }

    #[instrument(skip(self, description))]
    pub async fn create_session(&self, project_name: &str, description: Option<String>) -> Result<Session, EngineError> {
        let session = Session::new(project_name, description, Utc::now())?;
        self.repo.insert(&session).await?;
        info!(session_id = %session.id, backend = self.repo.backend(), "session created");
        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> Result<Session, EngineError> {
        Ok(self.repo.get(id).await?)
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<SessionSummary>, EngineError> {
        let sessions = self.repo.list(limit).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Finalize `phase` with the submitted data and outputs.
    ///
    /// The phase name is checked before the session is touched. No ordering
    /// is enforced between phases.
    #[instrument(skip(self, submission), fields(session_id = %id, phase = phase))]
    pub async fn complete_phase(
        &self,
        id: &SessionId,
        phase: &str,
        submission: PhaseSubmission,
        expected_revision: Option<u64>,
    ) -> Result<PhaseCompletion, EngineError> {
        let phase: Phase = phase.parse()?;
        let session = self
            .mutate(id, expected_revision, |s| {
                let _ = s.complete_phase(phase, submission, Utc::now());
                Ok(true)
            })
            .await?;

        info!(next_phase = %session.current_phase, revision = session.revision, "phase completed");
        Ok(PhaseCompletion {
            next_phase: session.current_phase,
            progress: session.progress(),
            session,
        })
    }

    /// Score a checklist and attach the result to `phase`.
    #[instrument(skip(self, responses), fields(session_id = %id, phase = phase, checklist = name))]
    pub async fn record_checklist(
        &self,
        id: &SessionId,
        phase: &str,
        name: &str,
        responses: Map<String, Value>,
    ) -> Result<(Session, ChecklistResult), EngineError> {
        let phase: Phase = phase.parse()?;
        let result = self.library.validate_checklist(name, responses, Utc::now()).await?;
        let recorded = result.clone();
        let session = self
            .mutate(id, None, |s| {
                s.record_checklist(phase, recorded, Utc::now());
                Ok(true)
            })
            .await?;
        info!(completion = result.completion_percentage, "checklist recorded");
        Ok((session, result))
    }

    /// Note a generated artifact on the session. Returns false if the session
    /// already listed it.
    pub async fn record_generated_file(&self, id: &SessionId, filename: &str) -> Result<bool, EngineError> {
        let mut added = false;
        let _ = self
            .mutate(id, None, |s| {
                added = s.add_generated_file(filename, Utc::now());
                Ok(added)
            })
            .await?;
        Ok(added)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn archive(&self, id: &SessionId) -> Result<Session, EngineError> {
        let session = self
            .mutate(id, None, |s| {
                if s.status == SessionStatus::Archived {
                    return Ok(false);
                }
                s.status = SessionStatus::Archived;
                s.updated_at = Utc::now();
                Ok(true)
            })
            .await?;
        info!("session archived");
        Ok(session)
    }

    /// Remove the session record and every artifact stored for it.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn delete(&self, id: &SessionId) -> Result<bool, EngineError> {
        let lock = self.lock_for(id);
        let deleted = {
            let _guard = lock.lock().await;
            let deleted = self.repo.delete(id).await?;
            let had_artifacts = self.documents.delete_all(id).await?;
            debug!(deleted, had_artifacts, "session removed");
            deleted
        };
        let _ = self.locks.remove(id);
        Ok(deleted)
    }

    pub async fn progress(&self, id: &SessionId) -> Result<ProgressReport, EngineError> {
        let session = self.repo.get(id).await?;
        Ok(ProgressReport {
            progress: session.progress(),
            completed_phases: session.completed_phases(),
            current_phase: session.current_phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_core::session::Output;
    use planwright_store::{ArtifactMetadata, Database, FileSessionRepo, SqliteSessionRepo};
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        service: Arc<SessionService>,
        documents: DocumentStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SqliteSessionRepo::new(Database::in_memory().unwrap()));
        fixture_with(dir, repo)
    }

    fn fixture_with(dir: tempfile::TempDir, repo: Arc<dyn SessionRepository>) -> Fixture {
        let documents = DocumentStore::new(dir.path().join("artifacts"));
        let checklists = dir.path().join("assets/checklists");
        std::fs::create_dir_all(&checklists).unwrap();
        std::fs::write(
            checklists.join("po-master.md"),
            "# PO Master\n## Alignment\n- [ ] One\n- [ ] Two\n- [ ] Three\n",
        )
        .unwrap();
        let library = AssetLibrary::new(dir.path().join("assets"));
        Fixture {
            service: Arc::new(SessionService::new(repo, documents.clone(), library)),
            documents,
            _dir: dir,
        }
    }

    fn data(value: serde_json::Value) -> PhaseSubmission {
        PhaseSubmission {
            data: value.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_names() {
        let f = fixture();
        assert!(matches!(
            f.service.create_session("   ", None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(f.service.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_each_phase_advances_in_order() {
        let f = fixture();
        let s = f.service.create_session("Acme Widget", None).await.unwrap();

        let mut expected = Phase::ALL.iter().skip(1).map(|p| WorkflowState::InPhase(*p)).collect::<Vec<_>>();
        expected.push(WorkflowState::Completed);

        for (phase, want) in Phase::ALL.iter().zip(expected) {
            let done = f
                .service
                .complete_phase(&s.id, phase.as_str(), PhaseSubmission::default(), None)
                .await
                .unwrap();
            assert_eq!(done.next_phase, want);
        }

        let finished = f.service.get(&s.id).await.unwrap();
        assert_eq!(finished.status, SessionStatus::Completed);
        assert!(finished.completed_at.is_some());
        assert_eq!(finished.revision, 6);
        assert_eq!(f.service.progress(&s.id).await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn analyst_brief_example() {
        let f = fixture();
        let s = f.service.create_session("Acme Widget", None).await.unwrap();
        let done = f
            .service
            .complete_phase(
                &s.id,
                "analyst",
                PhaseSubmission {
                    outputs: vec![Output::new("project-brief", "# Brief")],
                    ..Default::default()
                },
                Some(0),
            )
            .await
            .unwrap();
        assert_eq!(done.session.current_phase, WorkflowState::InPhase(Phase::Pm));
        assert!(done.session.phases.analyst.completed);
        assert_eq!(done.session.phases.analyst.outputs[0].filename, "project-brief.md");
        assert_eq!(done.progress, 17);
    }

    #[tokio::test]
    async fn later_phase_data_overrides_earlier() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        f.service.complete_phase(&s.id, "analyst", data(json!({"x": 1})), None).await.unwrap();
        let done = f.service.complete_phase(&s.id, "pm", data(json!({"x": 2})), None).await.unwrap();
        assert_eq!(done.session.global_data["x"], json!(2));
        assert_eq!(done.session.global_data["projectName"], json!("Acme"));
    }

    #[tokio::test]
    async fn unknown_phase_leaves_session_untouched() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        let err = f
            .service
            .complete_phase(&s.id, "qa", PhaseSubmission::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPhase(_)));
        assert_eq!(f.service.get(&s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        f.service.complete_phase(&s.id, "analyst", PhaseSubmission::default(), Some(0)).await.unwrap();
        let err = f
            .service
            .complete_phase(&s.id, "pm", PhaseSubmission::default(), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert!(!f.service.get(&s.id).await.unwrap().phases.pm.completed);
    }

    #[tokio::test]
    async fn concurrent_completions_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(FileSessionRepo::new(dir.path().join("sessions")));
        let f = fixture_with(dir, repo);
        let s = f.service.create_session("Acme", None).await.unwrap();

        let mut handles = Vec::new();
        for phase in Phase::ALL {
            let service = Arc::clone(&f.service);
            let id = s.id.clone();
            handles.push(tokio::spawn(async move {
                let mut fields = Map::new();
                let _ = fields.insert(phase.as_str().to_owned(), json!(true));
                let submission = PhaseSubmission {
                    data: fields,
                    ..Default::default()
                };
                service.complete_phase(&id, phase.as_str(), submission, None).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let done = f.service.get(&s.id).await.unwrap();
        assert_eq!(done.completed_phases().len(), 6);
        assert_eq!(done.revision, 6);
        for phase in Phase::ALL {
            assert_eq!(done.global_data[phase.as_str()], json!(true));
        }
    }

    #[tokio::test]
    async fn checklist_results_attach_to_phase() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        let responses = json!({"a": true, "b": "yes", "c": false}).as_object().cloned().unwrap();
        let (session, result) = f
            .service
            .record_checklist(&s.id, "po", "po-master", responses)
            .await
            .unwrap();
        assert_eq!(result.completion_percentage, 67);
        assert_eq!(session.phases.po.checklist_results["po-master"], result);
        assert!(!session.phases.po.completed);
        assert_eq!(session.revision, 1);
    }

    #[tokio::test]
    async fn generated_files_are_deduplicated() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        assert!(f.service.record_generated_file(&s.id, "acme-prd.md").await.unwrap());
        assert!(!f.service.record_generated_file(&s.id, "acme-prd.md").await.unwrap());
        let stored = f.service.get(&s.id).await.unwrap();
        assert_eq!(stored.generated_files, vec!["acme-prd.md"]);
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn archive_and_delete() {
        let f = fixture();
        let s = f.service.create_session("Acme", None).await.unwrap();
        f.documents
            .save(&s.id, "acme-prd.md", "body", &ArtifactMetadata::default())
            .await
            .unwrap();

        assert_eq!(f.service.archive(&s.id).await.unwrap().status, SessionStatus::Archived);
        assert!(f.service.delete(&s.id).await.unwrap());
        assert!(f.documents.list(&s.id).await.unwrap().is_empty());
        assert!(matches!(f.service.get(&s.id).await, Err(EngineError::NotFound(_))));
        assert!(!f.service.delete(&s.id).await.unwrap());
    }
}
