use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checklist::{percentage, ChecklistResult};
use crate::ids::SessionId;
use crate::phase::{Phase, WorkflowState};

pub const MAX_PROJECT_NAME_CHARS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Archived,
    Deleted,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Archived => write!(f, "archived"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Input that fails basic shape checks before anything is mutated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// A document produced during a phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    /// Document kind tag, e.g. "project-brief", "prd", "story".
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub filename: String,
}

impl Output {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            filename: format!("{kind}.md"),
            kind,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub completed: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checklist_results: BTreeMap<String, ChecklistResult>,
}

/// The six phase records. Every key is always present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecords {
    pub analyst: PhaseRecord,
    pub pm: PhaseRecord,
    pub architect: PhaseRecord,
    pub design_architect: PhaseRecord,
    pub po: PhaseRecord,
    pub sm: PhaseRecord,
}

impl PhaseRecords {
    pub fn get(&self, phase: Phase) -> &PhaseRecord {
        match phase {
            Phase::Analyst => &self.analyst,
            Phase::Pm => &self.pm,
            Phase::Architect => &self.architect,
            Phase::DesignArchitect => &self.design_architect,
            Phase::Po => &self.po,
            Phase::Sm => &self.sm,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseRecord {
        match phase {
            Phase::Analyst => &mut self.analyst,
            Phase::Pm => &mut self.pm,
            Phase::Architect => &mut self.architect,
            Phase::DesignArchitect => &mut self.design_architect,
            Phase::Po => &mut self.po,
            Phase::Sm => &mut self.sm,
        }
    }

    /// Records in workflow order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseRecord)> {
        Phase::ALL.into_iter().map(move |p| (p, self.get(p)))
    }
}

/// What a caller hands over when finalizing a phase.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSubmission {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    /// `None` keeps whatever was recorded on the phase beforehand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_results: Option<BTreeMap<String, ChecklistResult>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub current_phase: WorkflowState,
    pub status: SessionStatus,
    pub phases: PhaseRecords,
    #[serde(default)]
    pub global_data: Map<String, Value>,
    #[serde(default)]
    pub generated_files: Vec<String>,
    /// Incremented on every persisted write; used to reject stale updates.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Trim and bound-check a project name.
pub fn validate_project_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError("projectName is required".into()));
    }
    if name.chars().count() > MAX_PROJECT_NAME_CHARS {
        return Err(ValidationError(format!(
            "projectName must be at most {MAX_PROJECT_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_owned())
}

impl Session {
    pub fn new(
        project_name: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let project_name = validate_project_name(project_name)?;
        let mut global_data = Map::new();
        let _ = global_data.insert("projectName".into(), Value::String(project_name.clone()));

        Ok(Self {
            id: SessionId::new(),
            project_name,
            description: description.map(|d| d.trim().to_owned()).filter(|d| !d.is_empty()),
            current_phase: WorkflowState::INITIAL,
            status: SessionStatus::Active,
            phases: PhaseRecords::default(),
            global_data,
            generated_files: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Finalize `phase`: overwrite its record (recorded checklists carry over
    /// unless the submission brings its own), merge its data into
    /// `global_data` and move to the successor of `phase`.
    ///
    /// Predecessors are not required to be complete, so completing an earlier
    /// phase after later ones moves `current_phase` backward.
    pub fn complete_phase(
        &mut self,
        phase: Phase,
        submission: PhaseSubmission,
        now: DateTime<Utc>,
    ) -> WorkflowState {
        let PhaseSubmission {
            data,
            outputs,
            checklist_results,
        } = submission;

        for (key, value) in &data {
            let _ = self.global_data.insert(key.clone(), value.clone());
        }

        let outputs = outputs
            .into_iter()
            .map(|mut o| {
                if o.filename.trim().is_empty() {
                    o.filename = format!("{}.md", o.kind);
                }
                o
            })
            .collect();

        let record = self.phases.get_mut(phase);
        let checklist_results = checklist_results.unwrap_or_else(|| std::mem::take(&mut record.checklist_results));
        *record = PhaseRecord {
            completed: true,
            data,
            outputs,
            completed_at: Some(now),
            checklist_results,
        };

        let next = phase.successor();
        self.current_phase = next;
        if next.is_terminal() {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        next
    }

    /// Attach a checklist result to a phase without completing it.
    pub fn record_checklist(&mut self, phase: Phase, result: ChecklistResult, now: DateTime<Utc>) {
        let _ = self
            .phases
            .get_mut(phase)
            .checklist_results
            .insert(result.checklist_name.clone(), result);
        self.updated_at = now;
    }

    /// Remember a generated artifact. Returns false if it was already listed.
    pub fn add_generated_file(&mut self, filename: &str, now: DateTime<Utc>) -> bool {
        if self.generated_files.iter().any(|f| f == filename) {
            return false;
        }
        self.generated_files.push(filename.to_owned());
        self.updated_at = now;
        true
    }

    pub fn completed_phases(&self) -> Vec<Phase> {
        self.phases
            .iter()
            .filter(|(_, r)| r.completed)
            .map(|(p, _)| p)
            .collect()
    }

    /// `round(100 * completed / 6)`.
    pub fn progress(&self) -> u8 {
        percentage(self.completed_phases().len(), Phase::ALL.len())
    }
}

/// Lightweight listing view of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub project_name: String,
    pub current_phase: WorkflowState,
    pub status: SessionStatus,
    pub progress: u8,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            project_name: s.project_name.clone(),
            current_phase: s.current_phase,
            status: s.status,
            progress: s.progress(),
            revision: s.revision,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}
