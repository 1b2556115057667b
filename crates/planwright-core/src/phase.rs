use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six fixed planning stages, in workflow order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Analyst,
    Pm,
    Architect,
    DesignArchitect,
    Po,
    Sm,
}

/// Returned when a phase key is not one of the six known stages.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase: {0}")]
pub struct InvalidPhase(pub String);

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Analyst,
        Phase::Pm,
        Phase::Architect,
        Phase::DesignArchitect,
        Phase::Po,
        Phase::Sm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Pm => "pm",
            Self::Architect => "architect",
            Self::DesignArchitect => "designArchitect",
            Self::Po => "po",
            Self::Sm => "sm",
        }
    }

    /// Zero-based position in the workflow.
    pub fn index(self) -> usize {
        match self {
            Self::Analyst => 0,
            Self::Pm => 1,
            Self::Architect => 2,
            Self::DesignArchitect => 3,
            Self::Po => 4,
            Self::Sm => 5,
        }
    }

    /// The stage that follows this one, or `Completed` after `sm`.
    pub fn successor(self) -> WorkflowState {
        match Self::ALL.get(self.index() + 1) {
            Some(next) => WorkflowState::InPhase(*next),
            None => WorkflowState::Completed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = InvalidPhase;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| InvalidPhase(s.to_owned()))
    }
}

/// Where a session currently is: inside one of the six phases, or done.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WorkflowState {
    InPhase(Phase),
    Completed,
}

impl WorkflowState {
    pub const INITIAL: WorkflowState = WorkflowState::InPhase(Phase::Analyst);

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPhase(p) => p.as_str(),
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::InPhase(p) => Some(p),
            Self::Completed => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = InvalidPhase;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "completed" {
            Ok(Self::Completed)
        } else {
            s.parse().map(Self::InPhase)
        }
    }
}

impl TryFrom<String> for WorkflowState {
    type Error = InvalidPhase;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WorkflowState> for String {
    fn from(state: WorkflowState) -> Self {
        state.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successors_follow_fixed_order() {
        assert_eq!(Phase::Analyst.successor(), WorkflowState::InPhase(Phase::Pm));
        assert_eq!(Phase::Pm.successor(), WorkflowState::InPhase(Phase::Architect));
        assert_eq!(
            Phase::Architect.successor(),
            WorkflowState::InPhase(Phase::DesignArchitect)
        );
        assert_eq!(
            Phase::DesignArchitect.successor(),
            WorkflowState::InPhase(Phase::Po)
        );
        assert_eq!(Phase::Po.successor(), WorkflowState::InPhase(Phase::Sm));
        assert_eq!(Phase::Sm.successor(), WorkflowState::Completed);
    }

    #[test]
    fn parse_known_and_unknown_keys() {
        assert_eq!("designArchitect".parse::<Phase>().unwrap(), Phase::DesignArchitect);
        assert_eq!("qa".parse::<Phase>(), Err(InvalidPhase("qa".into())));
        assert!("design_architect".parse::<Phase>().is_err());
        assert!("completed".parse::<Phase>().is_err());
    }

    #[test]
    fn index_matches_all_order() {
        for (i, p) in Phase::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn workflow_state_serializes_as_plain_string() {
        let s = serde_json::to_string(&WorkflowState::InPhase(Phase::DesignArchitect)).unwrap();
        assert_eq!(s, "\"designArchitect\"");
        let done: WorkflowState = serde_json::from_str("\"completed\"").unwrap();
        assert!(done.is_terminal());
        assert!(serde_json::from_str::<WorkflowState>("\"qa\"").is_err());
    }

    #[test]
    fn phase_serde_uses_camel_case() {
        assert_eq!(serde_json::to_string(&Phase::Sm).unwrap(), "\"sm\"");
        let p: Phase = serde_json::from_str("\"designArchitect\"").unwrap();
        assert_eq!(p, Phase::DesignArchitect);
    }
}
