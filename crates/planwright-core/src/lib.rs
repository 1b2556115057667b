pub mod checklist;
pub mod errors;
pub mod generation;
pub mod ids;
pub mod phase;
pub mod session;

pub use checklist::{Checklist, ChecklistResult};
pub use errors::GatewayError;
pub use generation::GenerationGateway;
pub use ids::{PackageId, SessionId};
pub use phase::{InvalidPhase, Phase, WorkflowState};
pub use session::{
    Output, PhaseRecord, PhaseRecords, PhaseSubmission, Session, SessionStatus, SessionSummary,
    ValidationError,
};
