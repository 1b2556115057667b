use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::debug;

use planwright_core::checklist::{Checklist, ChecklistResult};

use crate::error::EngineError;

/// Short template ids and the file each resolves to.
const TEMPLATE_ALIASES: &[(&str, &str)] = &[
    ("project-brief", "project-brief.md"),
    ("prd", "prd.md"),
    ("architecture", "architecture.md"),
    ("frontend-architecture", "frontend-architecture.md"),
    ("uiux-specification", "uiux-specification.md"),
    ("story", "story.md"),
];

/// Read-only markdown assets: agent personas, document templates and
/// checklists, each in its own subdirectory of `root`.
#[derive(Clone, Debug)]
pub struct AssetLibrary {
    root: PathBuf,
}

fn checked_name<'a>(kind: &str, name: &'a str) -> Result<&'a str, EngineError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
        return Err(EngineError::Validation(format!("invalid {kind} name {name:?}")));
    }
    Ok(name)
}

/// Candidate filenames for a template id, in lookup order, without repeats.
fn template_candidates(name: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(3);
    let mut push = |c: String| {
        if !candidates.contains(&c) {
            candidates.push(c);
        }
    };
    if let Some((_, file)) = TEMPLATE_ALIASES.iter().find(|(id, _)| *id == name) {
        push((*file).to_owned());
    }
    push(name.to_owned());
    if !name.ends_with(".md") {
        push(format!("{name}.md"));
    }
    candidates
}

async fn read_optional(path: &Path) -> Result<Option<String>, EngineError> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl AssetLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn persona(&self, agent_id: &str) -> Result<String, EngineError> {
        let agent_id = checked_name("agent", agent_id)?;
        let path = self.root.join("personas").join(format!("{agent_id}.md"));
        read_optional(&path)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("persona {agent_id}")))
    }

    /// Resolve a template by alias, then literal name, then `{name}.md`.
    pub async fn template(&self, name: &str) -> Result<String, EngineError> {
        let name = checked_name("template", name)?;
        let dir = self.root.join("templates");
        let candidates = template_candidates(name);
        for candidate in &candidates {
            if let Some(body) = read_optional(&dir.join(candidate)).await? {
                debug!(template = name, file = %candidate, "template resolved");
                return Ok(body);
            }
        }
        Err(EngineError::NotFound(format!(
            "template {name} (looked for: {})",
            candidates.join(", ")
        )))
    }

    pub async fn checklist(&self, name: &str) -> Result<Checklist, EngineError> {
        let name = checked_name("checklist", name)?;
        let stem = name.strip_suffix(".md").unwrap_or(name);
        let dir = self.root.join("checklists");
        for candidate in [name.to_owned(), format!("{stem}.md")] {
            if let Some(markdown) = read_optional(&dir.join(&candidate)).await? {
                return Ok(Checklist::parse(stem, &markdown));
            }
        }
        Err(EngineError::NotFound(format!("checklist {name}")))
    }

    /// Score `responses` against the named checklist.
    pub async fn validate_checklist(
        &self,
        name: &str,
        responses: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<ChecklistResult, EngineError> {
        Ok(self.checklist(name).await?.validate(responses, now))
    }
}
