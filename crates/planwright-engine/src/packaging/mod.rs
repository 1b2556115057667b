//! Package builds: stage every completed output, derived agent prompt and
//! checklist result in a working tree, zip it, and register the archive for
//! time-limited download.

mod archive;
mod prompts;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use planwright_core::ids::{PackageId, SessionId};
use planwright_core::phase::Phase;
use planwright_core::session::Session;
use planwright_store::{DocumentStore, PackageRecord, PackageRepo};

use crate::error::EngineError;
use crate::naming;
use crate::phases::SessionService;

pub use prompts::PROMPT_ROLES;

/// Files every package carries besides phase outputs and checklists.
const FIXED_FILE_COUNT: usize = PROMPT_ROLES.len() + 1;

#[derive(Clone, Debug)]
pub struct PackagingConfig {
    /// Holds archives and per-build working trees.
    pub output_dir: PathBuf,
    /// How long an archive survives after its first download.
    pub download_retention: Duration,
    /// How long an archive survives if nobody downloads it.
    pub unclaimed_ttl: Duration,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub package_id: PackageId,
    pub session_id: SessionId,
    pub project_name: String,
    pub download_name: String,
    pub files: Vec<String>,
    pub size_bytes: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasePreview {
    pub phase: Phase,
    pub completed: bool,
    pub outputs: usize,
    pub output_types: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagePreview {
    pub session_id: SessionId,
    pub project_name: String,
    pub phases: Vec<PhasePreview>,
    pub estimated_file_count: usize,
}

/// A build that has claimed its session and not yet finished.
#[derive(Clone, Debug)]
struct InFlight {
    package_id: PackageId,
    cancel: CancellationToken,
}

/// Removes the in-flight marker for a session when the build ends, however
/// it ends.
struct BuildGuard<'a> {
    in_flight: &'a DashMap<SessionId, InFlight>,
    session_id: SessionId,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let _ = self.in_flight.remove(&self.session_id);
    }
}

/// Relative path → content, in archive order.
type StagedFiles = Vec<(String, String)>;

pub struct PackagingEngine {
    sessions: Arc<SessionService>,
    documents: DocumentStore,
    registry: PackageRepo,
    config: PackagingConfig,
    in_flight: DashMap<SessionId, InFlight>,
}

impl PackagingEngine {
    pub fn new(
        sessions: Arc<SessionService>,
        documents: DocumentStore,
        registry: PackageRepo,
        config: PackagingConfig,
    ) -> Self {
        Self {
            sessions,
            documents,
            registry,
            config,
            in_flight: DashMap::new(),
        }
    }

    fn archive_path(&self, package_id: &PackageId) -> PathBuf {
        self.config.output_dir.join(format!("{package_id}.zip"))
    }

    /// Assemble the package contents for a session.
    async fn collect_files(&self, session: &Session, generated_at: DateTime<Utc>) -> Result<StagedFiles, EngineError> {
        let documents = self.documents.context(&session.id).await?;
        let sources = prompts::PromptSources::new(session, &documents);
        let mut files: StagedFiles = Vec::new();

        let mut taken: HashSet<String> = HashSet::new();
        for (_, record) in session.phases.iter().filter(|(_, r)| r.completed) {
            for output in &record.outputs {
                let rel = unique_doc_path(&mut taken, &naming::path_component(&output.kind));
                files.push((rel, output.content.clone()));
            }
        }

        for role in PROMPT_ROLES {
            files.push((
                format!("agent-prompts/{role}-agent-prompt.md"),
                prompts::agent_prompt(role, &sources),
            ));
        }

        // One file per checklist; a later phase's result replaces an earlier one.
        let mut checklists: BTreeMap<String, String> = BTreeMap::new();
        for (_, record) in session.phases.iter().filter(|(_, r)| r.completed) {
            for (name, result) in &record.checklist_results {
                let rel = format!("checklists/completed-{}", naming::path_component(name));
                let _ = checklists.insert(rel, prompts::checklist_summary(name, result));
            }
        }
        files.extend(checklists);

        files.push(("README.md".to_owned(), prompts::readme(session, generated_at)));
        Ok(files)
    }

    /// Build and register a package for `session_id`. Only one build per
    /// session may run at a time.
    ///
    /// The build runs as its own task, so dropping the returned future (a
    /// request timeout or a client hanging up) still lets it finish and clean
    /// up its working files.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn build_package(self: &Arc<Self>, session_id: &SessionId) -> Result<PackageSummary, EngineError> {
        let session = self.sessions.get(session_id).await?;

        let job = InFlight {
            package_id: PackageId::new(),
            cancel: CancellationToken::new(),
        };
        match self.in_flight.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::Conflict(format!(
                    "a package build for session {session_id} is already running"
                )))
            }
            Entry::Vacant(slot) => {
                let _ = slot.insert(job.clone());
            }
        }

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = BuildGuard {
                in_flight: &engine.in_flight,
                session_id: session.id.clone(),
            };
            engine.run_build(&session, job.package_id, &job.cancel).await
        });
        let summary = task
            .await
            .map_err(|e| EngineError::Archive(format!("package build task failed: {e}")))??;
        info!(
            package_id = %summary.package_id,
            files = summary.files.len(),
            size_bytes = summary.size_bytes,
            "package built"
        );
        Ok(summary)
    }

    async fn run_build(
        &self,
        session: &Session,
        package_id: PackageId,
        cancel: &CancellationToken,
    ) -> Result<PackageSummary, EngineError> {
        let now = Utc::now();
        let staging = self.config.output_dir.join(format!("{package_id}.staging"));
        let partial = self.config.output_dir.join(format!("{package_id}.zip.partial"));
        let final_path = self.archive_path(&package_id);

        let built = self.stage_and_compress(session, now, &staging, &partial, cancel).await;
        if let Err(e) = fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staging.display(), error = %e, "could not remove package working tree");
            }
        }
        let (files, size_bytes) = match built {
            Ok(done) => done,
            Err(e) => {
                remove_quietly(&partial).await;
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            remove_quietly(&partial).await;
            return Err(EngineError::Cancelled);
        }
        if let Err(e) = fs::rename(&partial, &final_path).await {
            remove_quietly(&partial).await;
            return Err(e.into());
        }

        let record = PackageRecord {
            id: package_id,
            session_id: session.id.clone(),
            project_name: session.project_name.clone(),
            archive_path: final_path.clone(),
            download_name: format!("{}-{}.zip", naming::archive_slug(&session.project_name), session.id),
            files,
            size_bytes,
            created_at: now,
            downloaded_at: None,
            expires_at: now + self.config.unclaimed_ttl,
        };
        if let Err(e) = self.registry.insert(&record) {
            remove_quietly(&final_path).await;
            return Err(e.into());
        }

        Ok(PackageSummary {
            package_id: record.id,
            session_id: record.session_id,
            project_name: record.project_name,
            download_name: record.download_name,
            files: record.files,
            size_bytes: record.size_bytes,
            expires_at: record.expires_at,
        })
    }

    async fn stage_and_compress(
        &self,
        session: &Session,
        now: DateTime<Utc>,
        staging: &Path,
        partial: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, u64), EngineError> {
        let staged = self.collect_files(session, now).await?;
        for sub in ["docs", "agent-prompts", "checklists"] {
            fs::create_dir_all(staging.join(sub)).await?;
        }
        for (rel, content) in &staged {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            fs::write(staging.join(rel), content).await?;
        }
        debug!(files = staged.len(), "working tree staged");

        let files: Vec<String> = staged.into_iter().map(|(rel, _)| rel).collect();
        let root = staging.to_path_buf();
        let dest = partial.to_path_buf();
        let names = files.clone();
        let mut compress = tokio::task::spawn_blocking(move || archive::write_zip(&root, &names, &dest));

        let size = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Let the writer finish so the partial file can be removed after it.
                let _ = compress.await;
                return Err(EngineError::Cancelled);
            }
            joined = &mut compress => joined
                .map_err(|e| EngineError::Archive(format!("compression task failed: {e}")))??,
        };
        Ok((files, size))
    }

    /// Cancel the running build for a session. Returns false if none is running.
    pub fn cancel_build(&self, session_id: &SessionId) -> bool {
        match self.in_flight.get(session_id) {
            Some(job) => {
                job.cancel.cancel();
                info!(session_id = %session_id, "package build cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_building(&self, session_id: &SessionId) -> bool {
        self.in_flight.contains_key(session_id)
    }

    /// What a build would contain, without building it.
    pub async fn preview_package(&self, session_id: &SessionId) -> Result<PackagePreview, EngineError> {
        let session = self.sessions.get(session_id).await?;
        let phases: Vec<PhasePreview> = session
            .phases
            .iter()
            .map(|(phase, record)| PhasePreview {
                phase,
                completed: record.completed,
                outputs: record.outputs.len(),
                output_types: record.outputs.iter().map(|o| o.kind.clone()).collect(),
            })
            .collect();
        let completed_outputs: usize = phases.iter().filter(|p| p.completed).map(|p| p.outputs).sum();
        Ok(PackagePreview {
            session_id: session.id,
            project_name: session.project_name,
            phases,
            estimated_file_count: completed_outputs + FIXED_FILE_COUNT,
        })
    }

    /// Resolve a package for download and start its retention countdown.
    #[instrument(skip(self), fields(package_id = %package_id))]
    pub async fn open_download(&self, package_id: &PackageId) -> Result<PackageRecord, EngineError> {
        let now = Utc::now();
        let record = self.registry.get(package_id)?;
        if record.expires_at <= now {
            return Err(EngineError::NotFound(format!("package {package_id} has expired")));
        }
        if !fs::try_exists(&record.archive_path).await? {
            warn!(path = %record.archive_path.display(), "registered archive is missing");
            return Err(EngineError::NotFound(format!("package {package_id}")));
        }
        Ok(self.registry.mark_downloaded(package_id, now, self.config.download_retention)?)
    }

    /// Withdraw every package of a session and stop any build in progress.
    /// Returns how many registered packages were removed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn revoke_session(&self, session_id: &SessionId) -> Result<usize, EngineError> {
        let _ = self.cancel_build(session_id);
        let mut removed = 0;
        for record in self.registry.list_for_session(session_id)? {
            remove_quietly(&record.archive_path).await;
            if self.registry.delete(&record.id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "session packages revoked");
        }
        Ok(removed)
    }

    /// Delete archives and registry rows whose expiry has passed, along with
    /// working trees and partial archives no running build owns. Returns the
    /// number of registered packages removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let expired = self.registry.list_expired(now)?;
        let mut removed = 0;
        for record in expired {
            remove_quietly(&record.archive_path).await;
            if self.registry.delete(&record.id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "expired packages swept");
        }
        self.sweep_orphans().await?;
        Ok(removed)
    }

    /// Build leftovers from an interrupted process.
    async fn sweep_orphans(&self) -> Result<(), EngineError> {
        let active: HashSet<String> = self
            .in_flight
            .iter()
            .map(|job| job.package_id.to_string())
            .collect();
        let mut entries = match fs::read_dir(&self.config.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let (owner, is_dir) = if let Some(id) = name.strip_suffix(".staging") {
                (id, true)
            } else if let Some(id) = name.strip_suffix(".zip.partial") {
                (id, false)
            } else {
                continue;
            };
            if active.contains(owner) {
                continue;
            }
            let path = entry.path();
            let result = if is_dir {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => warn!(path = %path.display(), "removed abandoned package build output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove abandoned build output"),
            }
        }
        Ok(())
    }

    /// Periodic [`sweep_expired`](Self::sweep_expired) until `shutdown` fires.
    pub fn spawn_sweeper(self: Arc<Self>, interval: StdDuration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_expired(Utc::now()).await {
                            warn!(error = %e, "package sweep failed");
                        }
                    }
                }
            }
            debug!("package sweeper stopped");
        })
    }
}

/// `docs/{base}.md`, or the first `docs/{base}-{n}.md` (n >= 2) not yet used.
fn unique_doc_path(taken: &mut HashSet<String>, base: &str) -> String {
    let mut rel = format!("docs/{base}.md");
    let mut n = 1;
    while taken.contains(&rel) {
        n += 1;
        rel = format!("docs/{base}-{n}.md");
    }
    let _ = taken.insert(rel.clone());
    rel
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove file"),
    }
}
