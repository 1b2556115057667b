use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use planwright_core::ids::SessionId;

use crate::error::StoreError;

const HEADER_TITLE: &str = "Planwright Generated Document";
const UNKNOWN: &str = "unknown";

/// Matches exactly one leading header block in the format written by
/// [`render_header`].
static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\A<!--\nPlanwright Generated Document\nGenerated: ([^\n]*)\nSession: ([^\n]*)\nPhase: ([^\n]*)\nAgent: ([^\n]*)\nTemplate: ([^\n]*)\n-->\n\n",
    )
    .unwrap()
});

/// Where a generated document came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub phase: Option<String>,
    pub agent_id: Option<String>,
    pub template_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub session_id: SessionId,
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Header timestamp, or the file's modification time if it has no header.
    pub generated_at: DateTime<Utc>,
    pub metadata: ArtifactMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    pub descriptor: ArtifactDescriptor,
    /// Body with the header removed.
    pub content: String,
    /// File contents as stored, header included.
    pub raw_content: String,
}

/// One entry of a session's document context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Filename without the `.md` extension.
    pub name: String,
    pub filename: String,
    pub content: String,
}

/// Per-session directory of generated markdown documents.
///
/// Files are keyed by name within a session; saving an existing name replaces
/// it. Nothing here interprets document contents beyond the header block.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    root: PathBuf,
}

fn sanitize_field(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.replace(['\r', '\n'], " "),
        None => UNKNOWN.to_owned(),
    }
}

fn render_header(
    session_id: &SessionId,
    meta: &ArtifactMetadata,
    generated_at: DateTime<Utc>,
) -> String {
    format!(
        "<!--\n{HEADER_TITLE}\nGenerated: {}\nSession: {}\nPhase: {}\nAgent: {}\nTemplate: {}\n-->\n\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        sanitize_field(Some(session_id.as_str())),
        sanitize_field(meta.phase.as_deref()),
        sanitize_field(meta.agent_id.as_deref()),
        sanitize_field(meta.template_name.as_deref()),
    )
}

struct ParsedHeader {
    generated_at: Option<DateTime<Utc>>,
    metadata: ArtifactMetadata,
    body_offset: usize,
}

fn parse_header(raw: &str) -> Option<ParsedHeader> {
    let caps = HEADER_PATTERN.captures(raw)?;
    let field = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().to_owned())
            .filter(|v| v != UNKNOWN)
    };
    Some(ParsedHeader {
        generated_at: caps
            .get(1)
            .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
            .map(|t| t.with_timezone(&Utc)),
        metadata: ArtifactMetadata {
            phase: field(3),
            agent_id: field(4),
            template_name: field(5),
        },
        body_offset: caps.get(0).map_or(0, |m| m.end()),
    })
}

/// Remove one leading header block, if present.
pub fn strip_header(raw: &str) -> &str {
    match parse_header(raw) {
        Some(h) => &raw[h.body_offset..],
        None => raw,
    }
}

fn validate_filename(filename: &str) -> Result<(), StoreError> {
    // Dot-files are reserved for in-progress writes.
    let bad = filename.trim().is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidInput(format!("unusable filename {filename:?}")));
    }
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &SessionId) -> Result<PathBuf, StoreError> {
        if !session_id.is_path_safe() {
            return Err(StoreError::InvalidInput(format!("unusable session id {session_id:?}")));
        }
        Ok(self.root.join(session_id.as_str()))
    }

    fn file_path(&self, session_id: &SessionId, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        Ok(self.session_dir(session_id)?.join(filename))
    }

    /// Write `content` under `filename`, prefixed with a metadata header.
    pub async fn save(
        &self,
        session_id: &SessionId,
        filename: &str,
        content: &str,
        meta: &ArtifactMetadata,
    ) -> Result<ArtifactDescriptor, StoreError> {
        self.save_at(session_id, filename, content, meta, Utc::now()).await
    }

    /// [`save`](Self::save) with an explicit generation time.
    #[instrument(skip(self, content, meta), fields(session_id = %session_id, bytes = content.len()))]
    pub async fn save_at(
        &self,
        session_id: &SessionId,
        filename: &str,
        content: &str,
        meta: &ArtifactMetadata,
        generated_at: DateTime<Utc>,
    ) -> Result<ArtifactDescriptor, StoreError> {
        let path = self.file_path(session_id, filename)?;
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await?;

        let raw = format!("{}{}", render_header(session_id, meta, generated_at), content);
        let tmp_path = dir.join(format!(".{filename}.{}.tmp", Uuid::now_v7()));
        fs::write(&tmp_path, raw.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(format!("publish {}: {e}", path.display())));
        }

        debug!(path = %path.display(), "artifact saved");
        Ok(ArtifactDescriptor {
            session_id: session_id.clone(),
            filename: filename.to_owned(),
            path,
            size_bytes: raw.len() as u64,
            generated_at,
            metadata: meta.clone(),
        })
    }

    /// `None` when the file does not exist.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn read(
        &self,
        session_id: &SessionId,
        filename: &str,
    ) -> Result<Option<StoredArtifact>, StoreError> {
        let path = self.file_path(session_id, filename)?;
        self.load(session_id, filename, path).await
    }

    async fn load(
        &self,
        session_id: &SessionId,
        filename: &str,
        path: PathBuf,
    ) -> Result<Option<StoredArtifact>, StoreError> {
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("read {}: {e}", path.display()))),
        };
        let header = parse_header(&raw);

        let generated_at = match header.as_ref().and_then(|h| h.generated_at) {
            Some(ts) => ts,
            None => fs::metadata(&path)
                .await?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };
        let (metadata, body_offset) = match header {
            Some(h) => (h.metadata, h.body_offset),
            None => (ArtifactMetadata::default(), 0),
        };

        Ok(Some(StoredArtifact {
            descriptor: ArtifactDescriptor {
                session_id: session_id.clone(),
                filename: filename.to_owned(),
                path,
                size_bytes: raw.len() as u64,
                generated_at,
                metadata,
            },
            content: raw[body_offset..].to_owned(),
            raw_content: raw,
        }))
    }

    /// Every artifact of the session, newest first.
    async fn load_all(&self, session_id: &SessionId) -> Result<Vec<StoredArtifact>, StoreError> {
        let dir = self.session_dir(session_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_hidden(&path) || !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                warn!(path = %path.display(), "skipping non UTF-8 artifact name");
                continue;
            };
            if let Some(artifact) = self.load(session_id, &filename, path).await? {
                artifacts.push(artifact);
            }
        }

        artifacts.sort_by(|a, b| {
            b.descriptor
                .generated_at
                .cmp(&a.descriptor.generated_at)
                .then_with(|| a.descriptor.filename.cmp(&b.descriptor.filename))
        });
        Ok(artifacts)
    }

    /// Descriptors of every artifact, newest first.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn list(&self, session_id: &SessionId) -> Result<Vec<ArtifactDescriptor>, StoreError> {
        Ok(self
            .load_all(session_id)
            .await?
            .into_iter()
            .map(|a| a.descriptor)
            .collect())
    }

    /// Full bodies of every artifact, in listing order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn context(&self, session_id: &SessionId) -> Result<Vec<SessionDocument>, StoreError> {
        Ok(self
            .load_all(session_id)
            .await?
            .into_iter()
            .map(|a| SessionDocument {
                name: Path::new(&a.descriptor.filename)
                    .file_stem()
                    .map_or_else(|| a.descriptor.filename.clone(), |s| s.to_string_lossy().into_owned()),
                filename: a.descriptor.filename,
                content: a.content,
            })
            .collect())
    }

    /// Returns false if the file did not exist.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn delete(&self, session_id: &SessionId, filename: &str) -> Result<bool, StoreError> {
        let path = self.file_path(session_id, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the whole session directory. Returns false if it did not exist.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn delete_all(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let dir = self.session_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
