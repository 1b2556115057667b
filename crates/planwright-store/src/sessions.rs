use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tracing::instrument;

use planwright_core::ids::SessionId;
use planwright_core::session::Session;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Persistence for session records.
///
/// Implementations differ only in where the record lives; callers choose one
/// at construction time and never branch on it afterwards.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Short backend label for logs and health output.
    fn backend(&self) -> &'static str;

    /// Store a new session. Fails with `Conflict` if the id exists.
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    async fn get(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Most recently updated first.
    async fn list(&self, limit: u32) -> Result<Vec<Session>, StoreError>;

    /// Replace the stored record, provided its revision still equals
    /// `expected_revision`. Stale writes fail with `Conflict`.
    async fn update(&self, session: &Session, expected_revision: u64) -> Result<(), StoreError>;

    /// Returns false if nothing was stored under `id`.
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;
}

/// Sessions as rows in the service database.
pub struct SqliteSessionRepo {
    db: Database,
}

impl SqliteSessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, StoreError> {
    let document: String = row_helpers::get(row, 0, "sessions", "document")?;
    let revision: i64 = row_helpers::get(row, 1, "sessions", "revision")?;
    let mut session: Session = row_helpers::parse_json(&document, "sessions", "document")?;
    session.revision = u64::try_from(revision).map_err(|_| StoreError::CorruptRow {
        table: "sessions",
        column: "revision",
        detail: format!("negative revision {revision}"),
    })?;
    Ok(session)
}

fn revision_param(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision).map_err(|_| StoreError::InvalidInput(format!("revision {revision} overflows")))
}

#[async_trait]
impl SessionRepository for SqliteSessionRepo {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let document = serde_json::to_string(session)?;
        let revision = revision_param(session.revision)?;
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO sessions
                    (id, project_name, status, current_phase, revision, document, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    session.id.as_str(),
                    session.project_name,
                    session.status.to_string(),
                    session.current_phase.as_str(),
                    revision,
                    document,
                    row_helpers::format_ts(session.created_at),
                    row_helpers::format_ts(session.updated_at),
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(format!("session {} already exists", session.id)));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT document, revision FROM sessions WHERE id = ?1")?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: u32) -> Result<Vec<Session>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT document, revision FROM sessions
                 ORDER BY updated_at DESC, id DESC LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn update(&self, session: &Session, expected_revision: u64) -> Result<(), StoreError> {
        let document = serde_json::to_string(session)?;
        let revision = revision_param(session.revision)?;
        let expected = revision_param(expected_revision)?;
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET
                    project_name = ?1,
                    status = ?2,
                    current_phase = ?3,
                    revision = ?4,
                    document = ?5,
                    updated_at = ?6
                 WHERE id = ?7 AND revision = ?8",
                rusqlite::params![
                    session.project_name,
                    session.status.to_string(),
                    session.current_phase.as_str(),
                    revision,
                    document,
                    row_helpers::format_ts(session.updated_at),
                    session.id.as_str(),
                    expected,
                ],
            )?;
            if changed == 1 {
                return Ok(());
            }

            let stored: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM sessions WHERE id = ?1",
                    [session.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match stored {
                None => Err(StoreError::NotFound(format!("session {}", session.id))),
                Some(current) => Err(StoreError::Conflict(format!(
                    "session {} is at revision {current}, expected {expected_revision}",
                    session.id
                ))),
            }
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.as_str()])?;
            Ok(deleted > 0)
        })
    }
}
