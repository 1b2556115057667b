use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use planwright_core::ids::{PackageId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A built archive awaiting download or expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: PackageId,
    pub session_id: SessionId,
    pub project_name: String,
    pub archive_path: PathBuf,
    /// Filename offered to the client on download.
    pub download_name: String,
    pub files: Vec<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Persisted package registry. Expiry lives in the database so cleanup
/// survives restarts.
pub struct PackageRepo {
    db: Database,
}

const COLUMNS: &str = "id, session_id, project_name, archive_path, download_name, files,
                       size_bytes, created_at, downloaded_at, expires_at_ms";

fn row_to_package(row: &rusqlite::Row<'_>) -> Result<PackageRecord, StoreError> {
    let id: String = row_helpers::get(row, 0, "packages", "id")?;
    let session_id: String = row_helpers::get(row, 1, "packages", "session_id")?;
    let archive_path: String = row_helpers::get(row, 3, "packages", "archive_path")?;
    let files: String = row_helpers::get(row, 5, "packages", "files")?;
    let size_bytes: i64 = row_helpers::get(row, 6, "packages", "size_bytes")?;
    let created_at: String = row_helpers::get(row, 7, "packages", "created_at")?;
    let downloaded_at: Option<String> = row_helpers::get_opt(row, 8, "packages", "downloaded_at")?;
    let expires_at_ms: i64 = row_helpers::get(row, 9, "packages", "expires_at_ms")?;

    Ok(PackageRecord {
        id: PackageId::from_raw(id),
        session_id: SessionId::from_raw(session_id),
        project_name: row_helpers::get(row, 2, "packages", "project_name")?,
        archive_path: PathBuf::from(archive_path),
        download_name: row_helpers::get(row, 4, "packages", "download_name")?,
        files: row_helpers::parse_json(&files, "packages", "files")?,
        size_bytes: u64::try_from(size_bytes).unwrap_or_default(),
        created_at: row_helpers::parse_ts(&created_at, "packages", "created_at")?,
        downloaded_at: downloaded_at
            .map(|ts| row_helpers::parse_ts(&ts, "packages", "downloaded_at"))
            .transpose()?,
        expires_at: DateTime::from_timestamp_millis(expires_at_ms).ok_or_else(|| {
            StoreError::CorruptRow {
                table: "packages",
                column: "expires_at_ms",
                detail: format!("out of range: {expires_at_ms}"),
            }
        })?,
    })
}

impl PackageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, record), fields(package_id = %record.id, session_id = %record.session_id))]
    pub fn insert(&self, record: &PackageRecord) -> Result<(), StoreError> {
        let files = serde_json::to_string(&record.files)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO packages
                    (id, session_id, project_name, archive_path, download_name, files,
                     size_bytes, created_at, downloaded_at, expires_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    record.id.as_str(),
                    record.session_id.as_str(),
                    record.project_name,
                    record.archive_path.to_string_lossy(),
                    record.download_name,
                    files,
                    i64::try_from(record.size_bytes).unwrap_or(i64::MAX),
                    row_helpers::format_ts(record.created_at),
                    record.downloaded_at.map(row_helpers::format_ts),
                    record.expires_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(package_id = %id))]
    pub fn get(&self, id: &PackageId) -> Result<PackageRecord, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM packages WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_package(row),
                None => Err(StoreError::NotFound(format!("package {id}"))),
            }
        })
    }

    /// Stamp the first download and pull expiry in to `now + retention`.
    /// Later downloads leave the record untouched.
    #[instrument(skip(self), fields(package_id = %id))]
    pub fn mark_downloaded(
        &self,
        id: &PackageId,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<PackageRecord, StoreError> {
        let deadline = (now + retention).timestamp_millis();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE packages SET
                    downloaded_at = ?1,
                    expires_at_ms = MIN(expires_at_ms, ?2)
                 WHERE id = ?3 AND downloaded_at IS NULL",
                rusqlite::params![row_helpers::format_ts(now), deadline, id.as_str()],
            )?;
            Ok(())
        })?;
        self.get(id)
    }

    /// Packages whose expiry is at or before `now`.
    pub fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<PackageRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM packages WHERE expires_at_ms <= ?1 ORDER BY expires_at_ms"
            ))?;
            let mut rows = stmt.query([now.timestamp_millis()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_package(row)?);
            }
            Ok(results)
        })
    }

    pub fn list_for_session(&self, session_id: &SessionId) -> Result<Vec<PackageRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM packages WHERE session_id = ?1 ORDER BY created_at DESC"
            ))?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_package(row)?);
            }
            Ok(results)
        })
    }

    pub fn delete(&self, id: &PackageId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM packages WHERE id = ?1", [id.as_str()])?;
            Ok(deleted > 0)
        })
    }
}
